#![deny(unsafe_code)]
#![no_main]
#![no_std]

use defmt_rtt as _; // global logger
use panic_probe as _;
use rtic::app;
use rtic_monotonics::stm32::prelude::*;

mod cloud;
mod config;
mod eth;
mod network;
mod platform;
mod time;
mod tls_buffers;

stm32_tim2_monotonic!(Mono, 1_000_000);

#[app(device = embassy_stm32, peripherals = true, dispatchers = [USART1, USART2, USART3])]
mod app {
    use super::*;
    use bootstrap_core::{Bootstrap, Services};
    use defmt::{error, info};
    use embassy_futures::join::join4;
    use embassy_stm32::exti::ExtiInput;
    use embassy_stm32::gpio::{Level, Output, Pull, Speed};
    use embassy_stm32::peripherals;
    use embassy_stm32::rcc::{Hse, HseMode, LsConfig, LseConfig, LseMode};
    use embassy_stm32::rtc::{Rtc, RtcConfig};
    use embassy_stm32::spi::{self, Spi};
    use embassy_stm32::time::Hertz;

    use crate::cloud::{KeyStore, LinkedHub, PreassignedAuthority};
    use crate::config::{MqttConfig, NetworkConfig, SntpConfig};
    use crate::network::EthernetLink;
    use crate::platform::Feather;
    use crate::time::{InternalRtc, MonoTicks, SntpTimeSource};

    type SpiPeripheral = embassy_stm32::Peri<'static, peripherals::SPI2>;
    type PinPB13 = embassy_stm32::Peri<'static, peripherals::PB13>;
    type PinPB15 = embassy_stm32::Peri<'static, peripherals::PB15>;
    type PinPB14 = embassy_stm32::Peri<'static, peripherals::PB14>;
    type PinPC6 = embassy_stm32::Peri<'static, peripherals::PC6>;
    type PinPC3 = embassy_stm32::Peri<'static, peripherals::PC3>;
    type PinPC2 = embassy_stm32::Peri<'static, peripherals::PC2>;
    type ExtiChannel = embassy_stm32::Peri<'static, peripherals::EXTI2>;
    type DmaTx = embassy_stm32::Peri<'static, peripherals::DMA1_CH4>;
    type DmaRx = embassy_stm32::Peri<'static, peripherals::DMA1_CH3>;
    type RngPeripheral = embassy_stm32::Peri<'static, peripherals::RNG>;

    struct EthernetPins {
        spi: SpiPeripheral,
        sck: PinPB13,
        mosi: PinPB15,
        miso: PinPB14,
        cs: PinPC6,
        reset: PinPC3,
        int: PinPC2,
        exti: ExtiChannel,
        dma_tx: DmaTx,
        dma_rx: DmaRx,
    }

    embassy_stm32::bind_interrupts!(struct RngIrqs {
        RNG => embassy_stm32::rng::InterruptHandler<peripherals::RNG>;
    });

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        led: Output<'static>,
    }

    #[init]
    fn init(_cx: init::Context) -> (Shared, Local) {
        info!("Device bootstrap starting...");

        // Adafruit Feather STM32F405: 12 MHz HSE, 32.768 kHz LSE (PC14/PC15)
        let mut config = embassy_stm32::Config::default();
        config.rcc.hse = Some(Hse {
            freq: Hertz(12_000_000),
            mode: HseMode::Oscillator,
        });

        // 12 MHz / 6 * 168 = 336 MHz VCO; P /4 = 84 MHz SYSCLK, Q /7 = 48 MHz for the RNG
        config.rcc.pll_src = embassy_stm32::rcc::PllSource::HSE;
        config.rcc.pll = Some(embassy_stm32::rcc::Pll {
            prediv: embassy_stm32::rcc::PllPreDiv::DIV6,
            mul: embassy_stm32::rcc::PllMul::MUL168,
            divp: Some(embassy_stm32::rcc::PllPDiv::DIV4),
            divq: Some(embassy_stm32::rcc::PllQDiv::DIV7),
            divr: None,
        });
        config.rcc.sys = embassy_stm32::rcc::Sysclk::PLL1_P;
        config.rcc.ahb_pre = embassy_stm32::rcc::AHBPrescaler::DIV1;
        config.rcc.apb1_pre = embassy_stm32::rcc::APBPrescaler::DIV2;
        config.rcc.apb2_pre = embassy_stm32::rcc::APBPrescaler::DIV1;

        config.rcc.ls = LsConfig {
            rtc: embassy_stm32::rcc::RtcClockSource::LSE,
            lsi: false,
            lse: Some(LseConfig {
                frequency: Hertz(32_768),
                mode: LseMode::Oscillator(embassy_stm32::rcc::LseDrive::MediumHigh),
            }),
        };

        let p = embassy_stm32::init(config);

        // TIM2 sits on APB1 (42 MHz) with a prescaler, so it runs at 84 MHz
        Mono::start(84_000_000);

        InternalRtc::install(Rtc::new(p.RTC, RtcConfig::default()));
        info!("Clocks, monotonic and RTC initialized");

        let led = Output::new(p.PC1, Level::High, Speed::Low);

        let pins = EthernetPins {
            spi: p.SPI2,
            sck: p.PB13,
            mosi: p.PB15,
            miso: p.PB14,
            cs: p.PC6,
            reset: p.PC3,
            int: p.PC2,
            exti: p.EXTI2,
            dma_tx: p.DMA1_CH4,
            dma_rx: p.DMA1_CH3,
        };

        heartbeat::spawn().ok();
        bootstrap_task::spawn(pins, p.RNG).ok();

        (Shared {}, Local { led })
    }

    #[task(priority = 1, local = [led])]
    async fn heartbeat(cx: heartbeat::Context) {
        loop {
            cx.local.led.set_high();
            Mono::delay(100.millis()).await;
            cx.local.led.set_low();
            Mono::delay(4900.millis()).await;
        }
    }

    /// Brings up Ethernet, then runs the bootstrap next to the stack and hub link
    ///
    /// Stack is !Send and must remain within this task.
    #[task(priority = 1)]
    async fn bootstrap_task(_cx: bootstrap_task::Context, pins: EthernetPins, rng: RngPeripheral) {
        use embassy_net::StackResources;
        use embassy_stm32::rng::Rng;
        use static_cell::StaticCell;

        let net_config = NetworkConfig::default();

        let mut spi_config = spi::Config::default();
        spi_config.frequency = Hertz(10_000_000);

        let spi = Spi::new(
            pins.spi,
            pins.sck,
            pins.mosi,
            pins.miso,
            pins.dma_tx,
            pins.dma_rx,
            spi_config,
        );

        let eth_periph = eth::EthPeripherals {
            spi,
            cs: Output::new(pins.cs, Level::High, Speed::VeryHigh),
            reset: Output::new(pins.reset, Level::High, Speed::Low),
            int: ExtiInput::new(pins.int, pins.exti, Pull::Up),
        };

        let (device, w5500_runner) = match eth::init_w5500(eth_periph, net_config.mac_addr).await {
            Ok(parts) => parts,
            Err(e) => {
                error!("Ethernet unavailable: {}", e);
                run_bootstrap(None).await;
                return;
            }
        };

        static RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
        let (stack, mut net_runner) = embassy_net::new(
            device,
            embassy_net::Config::dhcpv4(Default::default()),
            RESOURCES.init(StackResources::new()),
            net_config.seed,
        );

        let mut rng = Rng::new(rng, RngIrqs);
        let link = EthernetLink::new(stack, net_config.mac_addr, net_config.dhcp_timeout_ms);

        join4(
            w5500_runner.run(),
            net_runner.run(),
            cloud::run_cloud_link(stack, &mut rng, MqttConfig::default()),
            run_bootstrap(Some(link)),
        )
        .await;
    }

    async fn run_bootstrap(link: Option<EthernetLink>) {
        let services = Services::<Feather> {
            time_source: SntpTimeSource::new(SntpConfig::default()),
            rtc: InternalRtc::new(),
            security: KeyStore::new(),
            provisioning: PreassignedAuthority::new(config::ASSIGNED_HUB, config::registration_id()),
            hub: LinkedHub,
            ticks: MonoTicks,
            delay: embassy_time::Delay,
        };

        let mut bootstrap = Bootstrap::<Feather>::new(config::bootstrap_config(), link, services);
        let result = bootstrap.run().await;
        if let Some(ts) = bootstrap.services().time_source.last() {
            info!("Clock was set to {}.{:06} UTC", ts.unix_secs, ts.micros);
        }
        match result {
            Ok(summary) => info!(
                "Bootstrap finished ({}): {} of {} messages accepted",
                summary.exit, summary.accepted, summary.attempted
            ),
            Err(e) => error!("Bootstrap failed: {}", e),
        }
    }

    #[idle]
    fn idle(_cx: idle::Context) -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }
}
