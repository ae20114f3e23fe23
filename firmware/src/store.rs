//! Settings bytes kept in one flash page.
//!
//! Flash only clears a whole page at a time, so the store keeps a RAM mirror
//! of the settings and rewrites the page from it on every change. Reads never
//! touch flash after boot.

use core::fmt;

use door_core::persist::{ByteStore, ERASED};

/// Settings bytes mirrored in RAM; a multiple of the flash write unit.
pub const STORE_BYTES: usize = 16;

/// The page that backs a [`FlashStore`].
pub trait PageFlash {
    type Error: fmt::Debug;

    /// Reads `bytes.len()` bytes from the start of the page.
    fn read(&mut self, bytes: &mut [u8]) -> Result<(), Self::Error>;

    fn erase(&mut self) -> Result<(), Self::Error>;

    /// Programs `bytes` at the start of a freshly erased page.
    fn program(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FlashStoreError<E> {
    OutOfRange,
    Flash(E),
}

impl<E: fmt::Debug> fmt::Display for FlashStoreError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

pub struct FlashStore<F, const N: usize = STORE_BYTES> {
    flash: F,
    mirror: [u8; N],
}

impl<F: PageFlash, const N: usize> FlashStore<F, N> {
    /// Loads the mirror from the page.
    pub fn open(mut flash: F) -> Result<Self, (F, F::Error)> {
        let mut mirror = [ERASED; N];
        match flash.read(&mut mirror) {
            Ok(()) => Ok(Self { flash, mirror }),
            Err(error) => Err((flash, error)),
        }
    }

    /// Starts from erased settings without reading the page.
    pub const fn erased(flash: F) -> Self {
        Self {
            flash,
            mirror: [ERASED; N],
        }
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }
}

impl<F: PageFlash, const N: usize> ByteStore for FlashStore<F, N> {
    type Error = FlashStoreError<F::Error>;

    fn read(&self, address: u16) -> u8 {
        self.mirror
            .get(usize::from(address))
            .copied()
            .unwrap_or(ERASED)
    }

    fn update(&mut self, address: u16, value: u8) -> Result<(), Self::Error> {
        let cell = self
            .mirror
            .get_mut(usize::from(address))
            .ok_or(FlashStoreError::OutOfRange)?;
        if *cell == value {
            return Ok(());
        }
        *cell = value;

        self.flash.erase().map_err(FlashStoreError::Flash)?;
        self.flash
            .program(&self.mirror)
            .map_err(FlashStoreError::Flash)
    }
}

#[cfg(test)]
mod tests {
    use door_core::persist::{AUTO_CLOSE_ADDRESS, AUTO_CLOSED_VALUE, AutoCloseFeedback};

    use super::*;

    #[derive(Debug, Eq, PartialEq)]
    struct Worn;

    /// Page of RAM that behaves like NOR flash: programming only clears bits.
    struct RamPage {
        cells: [u8; 64],
        erases: u32,
        fail: bool,
    }

    impl RamPage {
        fn new() -> Self {
            Self {
                cells: [ERASED; 64],
                erases: 0,
                fail: false,
            }
        }
    }

    impl PageFlash for RamPage {
        type Error = Worn;

        fn read(&mut self, bytes: &mut [u8]) -> Result<(), Worn> {
            if self.fail {
                return Err(Worn);
            }
            bytes.copy_from_slice(&self.cells[..bytes.len()]);
            Ok(())
        }

        fn erase(&mut self) -> Result<(), Worn> {
            if self.fail {
                return Err(Worn);
            }
            self.cells = [ERASED; 64];
            self.erases += 1;
            Ok(())
        }

        fn program(&mut self, bytes: &[u8]) -> Result<(), Worn> {
            for (cell, byte) in self.cells.iter_mut().zip(bytes) {
                *cell &= *byte;
            }
            Ok(())
        }
    }

    #[test]
    fn settings_survive_a_reopen() {
        let mut store = FlashStore::<_, STORE_BYTES>::erased(RamPage::new());
        let mut feedback = AutoCloseFeedback::load(&store);
        feedback
            .register_successful_auto_close(&mut store)
            .expect("write succeeds");

        let reopened = FlashStore::<_, STORE_BYTES>::open(store.flash)
            .unwrap_or_else(|_| panic!("page reads back"));

        assert_eq!(reopened.read(AUTO_CLOSE_ADDRESS), AUTO_CLOSED_VALUE);
        assert!(AutoCloseFeedback::load(&reopened).is_auto_closed());
    }

    #[test]
    fn unchanged_value_does_not_erase() {
        let mut store = FlashStore::<_, STORE_BYTES>::erased(RamPage::new());
        store.update(3, 0x42).expect("write succeeds");
        store.update(3, 0x42).expect("write succeeds");

        assert_eq!(store.flash().erases, 1);
    }

    #[test]
    fn rewrites_keep_the_other_cells() {
        let mut store = FlashStore::<_, STORE_BYTES>::erased(RamPage::new());
        store.update(0, 0x11).expect("write succeeds");
        store.update(1, 0x22).expect("write succeeds");
        store.update(0, 0x33).expect("write succeeds");

        assert_eq!(&store.flash().cells[..3], &[0x33, 0x22, ERASED]);
    }

    #[test]
    fn rejects_addresses_past_the_mirror() {
        let mut store = FlashStore::<_, STORE_BYTES>::erased(RamPage::new());
        let address = u16::try_from(STORE_BYTES).expect("fits");

        assert_eq!(
            store.update(address, 0),
            Err(FlashStoreError::OutOfRange)
        );
        assert_eq!(store.read(address), ERASED);
    }

    #[test]
    fn flash_failures_are_reported_and_the_mirror_keeps_the_value() {
        let mut page = RamPage::new();
        page.fail = true;
        let opened = FlashStore::<_, STORE_BYTES>::open(page);
        let Err((page, Worn)) = opened else {
            panic!("read failure is reported");
        };

        let mut store = FlashStore::<_, STORE_BYTES>::erased(page);
        assert_eq!(store.update(0, 7), Err(FlashStoreError::Flash(Worn)));
        assert_eq!(store.read(0), 7);
    }
}
