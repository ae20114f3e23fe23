use embassy_futures::join::join;
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::usart::{
    BufferedUart, Config as UartConfig, ConfigError, DataBits, Parity, StopBits,
};
use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};
use static_cell::StaticCell;

use super::now;
use crate::link::{FrameAssembler, INBOUND_FRAME_LEN, LINK_QUEUE_DEPTH, NodeLinkQueue};
use crate::status;

const LINK_UART_BUFFER_SIZE: usize = 16 * LINK_QUEUE_DEPTH;
const LINK_UART_BAUD: u32 = 115_200;
const UART_RETRY_DELAY_MS: u64 = 5;

static UART_TX_BUFFER: StaticCell<[u8; LINK_UART_BUFFER_SIZE]> = StaticCell::new();
static UART_RX_BUFFER: StaticCell<[u8; LINK_UART_BUFFER_SIZE]> = StaticCell::new();

embassy_stm32::bind_interrupts!(struct UartIrqs {
    USART3_4_5_6_LPUART1 => embassy_stm32::usart::BufferedInterruptHandler<hal::peripherals::USART5>;
});

/// Opens the link UART at 115200 8N1. Called once, before any task runs.
pub fn open_uart(
    usart: Peri<'static, hal::peripherals::USART5>,
    tx_pin: Peri<'static, hal::peripherals::PB0>,
    rx_pin: Peri<'static, hal::peripherals::PB1>,
) -> Result<BufferedUart<'static>, ConfigError> {
    let mut config = UartConfig::default();
    config.baudrate = LINK_UART_BAUD;
    config.data_bits = DataBits::DataBits8;
    config.stop_bits = StopBits::STOP1;
    config.parity = Parity::ParityNone;

    let tx_buffer = UART_TX_BUFFER.init([0; LINK_UART_BUFFER_SIZE]);
    let rx_buffer = UART_RX_BUFFER.init([0; LINK_UART_BUFFER_SIZE]);

    BufferedUart::new(
        usart, rx_pin, tx_pin, tx_buffer, rx_buffer, UartIrqs, config,
    )
}

/// Moves frames between the serial link and the control task.
#[embassy_executor::task]
pub async fn run(queue: &'static NodeLinkQueue, uart: BufferedUart<'static>) -> ! {
    let (mut uart_tx, mut uart_rx) = uart.split();

    let outbound = queue.outbound_receiver();
    let inbound = queue.inbound_sender();

    let to_uart = async move {
        loop {
            let frame = outbound.receive().await;
            if uart_tx.write_all(&frame).await.is_err() || uart_tx.flush().await.is_err() {
                status::record_uart_error();
                defmt::warn!("link: UART write error");
                Timer::after(Duration::from_millis(UART_RETRY_DELAY_MS)).await;
            }
        }
    };

    let from_uart = async move {
        let mut assembler = FrameAssembler::<INBOUND_FRAME_LEN>::new();
        let mut ingress = [0u8; LINK_UART_BUFFER_SIZE];
        loop {
            match uart_rx.read(&mut ingress).await {
                Ok(count) => {
                    let skipped_before = assembler.skipped();
                    let now = now();
                    for byte in &ingress[..count] {
                        if let Some(frame) = assembler.push(*byte, now) {
                            status::record_frame_received();
                            if inbound.try_send(frame).is_err() {
                                status::record_frame_dropped();
                            }
                        }
                    }
                    status::record_bytes_skipped(assembler.skipped().wrapping_sub(skipped_before));
                }
                Err(_) => {
                    status::record_uart_error();
                    defmt::warn!("link: UART read error");
                    Timer::after(Duration::from_millis(UART_RETRY_DELAY_MS)).await;
                }
            }
        }
    };

    join(to_uart, from_uart).await;
    loop {
        core::future::pending::<()>().await;
    }
}
