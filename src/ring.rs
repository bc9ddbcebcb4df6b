//! WS2812 ring on SPIM3 through `ws2812-spi`.
//!
//! Only MOSI carries the signal; the driver pre-renders every frame
//! into a RAM buffer that EasyDMA clocks out in one transfer.

use defmt::{info, warn};
use embassy_nrf::peripherals::SPI3;
use embassy_nrf::spim::Spim;
use heartring::config::{RING_BRIGHTNESS, RING_LED_COUNT};
use heartring::led::LedRing;
use smart_leds::{brightness, SmartLedsWrite, RGB8};
use static_cell::StaticCell;
use ws2812_spi::prerendered::Ws2812;

/// ws2812-spi pre-rendered size: 12 SPI bytes per LED.
const SPI_BUF_LEN: usize = RING_LED_COUNT * 12;

const OFF: RGB8 = RGB8 { r: 0, g: 0, b: 0 };

static SPI_BUF: StaticCell<[u8; SPI_BUF_LEN]> = StaticCell::new();

pub struct SpiRing {
    ws: Ws2812<'static, Spim<'static, SPI3>>,
    pixels: [RGB8; RING_LED_COUNT],
    write_err_logged: bool,
}

impl SpiRing {
    pub fn new(spi: Spim<'static, SPI3>) -> Self {
        Self {
            ws: Ws2812::new(spi, SPI_BUF.init([0; SPI_BUF_LEN])),
            pixels: [OFF; RING_LED_COUNT],
            write_err_logged: false,
        }
    }
}

impl LedRing for SpiRing {
    fn set_all(&mut self, color: RGB8) {
        self.pixels.fill(color);
    }

    fn clear(&mut self) {
        self.pixels.fill(OFF);
    }

    fn render(&mut self) {
        match self
            .ws
            .write(brightness(self.pixels.iter().copied(), RING_BRIGHTNESS))
        {
            Err(e) if !self.write_err_logged => {
                warn!("LED write error: {}", defmt::Debug2Format(&e));
                self.write_err_logged = true;
            }
            Ok(()) if self.write_err_logged => {
                info!("LED write recovered");
                self.write_err_logged = false;
            }
            _ => {}
        }
    }
}
