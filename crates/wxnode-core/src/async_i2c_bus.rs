//! Async I2C bus sharing
//!
//! The primary and secondary sensors sit on the same bus. Each driver gets its
//! own `AsyncI2cDevice` handle; the handles serialize transactions through an
//! embassy async `Mutex`, which may be held across await points.
//!
//! ```ignore
//! static I2C_BUS: StaticCell<SharedI2c<I2c<'static, Async>>> = StaticCell::new();
//!
//! let bus = I2C_BUS.init(Mutex::new(i2c));
//! let bme = Bme280::new(AsyncI2cDevice::new(bus), Delay, ADDRESS_PRIMARY);
//! let sht = SHT40Sensor::new(AsyncI2cDevice::new(bus), Delay);
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

/// Bus shared by every device handle.
pub type SharedI2c<T> = Mutex<CriticalSectionRawMutex, T>;

/// Handle to one device on a [`SharedI2c`] bus.
pub struct AsyncI2cDevice<'a, T> {
    bus: &'a SharedI2c<T>,
}

impl<'a, T> AsyncI2cDevice<'a, T> {
    #[inline]
    pub const fn new(bus: &'a SharedI2c<T>) -> Self {
        Self { bus }
    }
}

impl<T: ErrorType> ErrorType for AsyncI2cDevice<'_, T> {
    type Error = T::Error;
}

impl<T: I2c> I2c for AsyncI2cDevice<'_, T> {
    #[inline]
    async fn read(&mut self, address: u8, read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.read(address, read).await
    }

    #[inline]
    async fn write(&mut self, address: u8, write: &[u8]) -> Result<(), Self::Error> {
        self.bus.lock().await.write(address, write).await
    }

    /// The bus stays locked between the register write and the read, so no
    /// other handle can move the register pointer in between.
    #[inline]
    async fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.write_read(address, write, read).await
    }

    #[inline]
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.bus.lock().await.transaction(address, operations).await
    }
}
