use embassy_stm32::adc::{Adc, AdcChannel, AnyAdcChannel};
use embassy_stm32::gpio::{Input, Pull};
use embassy_stm32::mode::Async;
use embassy_stm32::peripherals::ADC1;
use embassy_stm32::time::Hertz;
use embassy_stm32::usart::{Config as UsartConfig, ConfigError, Uart};
use embassy_stm32::{bind_interrupts, i2c, peripherals, rcc, usart, Config};
use static_cell::StaticCell;

use crate::acquisition::AuxInputs;
use crate::config::{I2C_FREQUENCY_HZ, UART_BAUDRATE, UART_RX_BUFFER_LEN};

// ── IRQ table ─────────────────────────────────────────────
bind_interrupts!(pub struct Irqs {
    USART1 => usart::InterruptHandler<peripherals::USART1>;
    I2C2   => i2c::EventInterruptHandler<peripherals::I2C2>,
              i2c::ErrorInterruptHandler<peripherals::I2C2>;
});

static UART_RX_BUF: StaticCell<[u8; UART_RX_BUFFER_LEN]> = StaticCell::new();

/// Potentiometer on PA0 and the two push buttons (active low).
pub struct AuxPins {
    adc: Adc<'static, ADC1>,
    analog: AnyAdcChannel<ADC1>,
    button_0: Input<'static>,
    button_1: Input<'static>,
}

impl AuxInputs for AuxPins {
    fn analog(&mut self) -> u16 {
        // 12-bit conversion scaled down to the 10-bit range the host expects
        self.adc.blocking_read(&mut self.analog) >> 2
    }

    fn buttons(&mut self) -> [bool; 2] {
        [self.button_0.is_low(), self.button_1.is_low()]
    }
}

// ── Board struct ──────────────────────────────────────────
pub struct Board {
    pub uart_tx: usart::UartTx<'static, Async>,
    pub uart_rx: usart::RingBufferedUartRx<'static>,
    pub i2c: i2c::I2c<'static, Async>, // DMA
    pub aux: AuxPins,
}

impl Board {
    pub fn init() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // HSI 16MHz -> PLL -> 64MHz SYSCLK
        config.rcc.hsi = Some(rcc::Hsi {
            sys_div: rcc::HsiSysDiv::DIV1,
        });
        config.rcc.pll = Some(rcc::Pll {
            source: rcc::PllSource::HSI,
            prediv: rcc::PllPreDiv::DIV2,   // 16MHz / 2 = 8MHz
            mul: rcc::PllMul::MUL16,        // 8MHz * 16 = 128MHz
            divp: None,
            divq: None,
            divr: Some(rcc::PllRDiv::DIV2), // 128MHz / 2 = 64MHz
        });
        config.rcc.sys = rcc::Sysclk::PLL1_R;
        let p = embassy_stm32::init(config);

        // Host link: USART1 (DMA CH3 TX, CH2 RX)
        let mut us_cfg = UsartConfig::default();
        us_cfg.baudrate = UART_BAUDRATE;
        us_cfg.rx_pull = Pull::Up;

        let uart = Uart::new(p.USART1, p.PC5, p.PC4, Irqs, p.DMA1_CH2, p.DMA1_CH3, us_cfg)?;
        let (uart_tx, rx) = uart.split();
        // DMA-circular RX driver
        let uart_rx = rx.into_ring_buffered(UART_RX_BUF.init([0; UART_RX_BUFFER_LEN]));

        // MPU-6050 on I²C2 (DMA CH7 TX, CH6 RX); the breakout has its own pull-ups
        let mut i2c_cfg = i2c::Config::default();
        i2c_cfg.sda_pullup = false;
        i2c_cfg.scl_pullup = false;

        let i2c = i2c::I2c::new(
            p.I2C2,
            p.PB10,
            p.PB11,
            Irqs,
            p.DMA1_CH7,
            p.DMA1_CH6,
            Hertz(I2C_FREQUENCY_HZ),
            i2c_cfg,
        );

        let aux = AuxPins {
            adc: Adc::new(p.ADC1),
            analog: p.PA0.degrade_adc(),
            button_0: Input::new(p.PB0, Pull::Up),
            button_1: Input::new(p.PB1, Pull::Up),
        };

        Ok(Self {
            uart_tx,
            uart_rx,
            i2c,
            aux,
        })
    }
}
