//! sdboot - SD card field-update bootloader
//!
//! Board bring-up for an ATSAMD21G18 board with a microSD socket on
//! SERCOM4 (Adafruit Feather M0 Adalogger pinout). Everything after
//! bring-up is the board-agnostic boot sequence from `sdboot-core`.

#![no_std]
#![no_main]

use atsamd_hal::clock::GenericClockController;
use atsamd_hal::fugit::RateExtU32;
use atsamd_hal::gpio::{AlternateD, Pin, Pins, PA12, PB10, PB11};
use atsamd_hal::sercom::spi;
use cortex_m_rt::entry;
use defmt::*;
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_sdmmc::SdCard;
use {defmt_rtt as _, panic_probe as _};

use sdboot_core::{BootConfig, Bootloader, SlotConfig};
use sdboot_hal_samd21::pac;
use sdboot_hal_samd21::{
    reset_sercom, CortexMLauncher, CycleDelay, DsuCrc, FixedTime, Samd21Nvm, Samd21System,
    SdStorage,
};

/// Configuration compiled in from boot.toml
mod boot_config {
    include!(concat!(env!("OUT_DIR"), "/boot_config.rs"));
}

/// SD card clock; cards must be initialized at or below 400 kHz
const SD_BAUD_HZ: u32 = 400_000;

type Miso = Pin<PA12, AlternateD>;
type Mosi = Pin<PB10, AlternateD>;
type Sclk = Pin<PB11, AlternateD>;

fn boot_config() -> BootConfig {
    BootConfig {
        app_base: boot_config::APP_BASE,
        pages_per_row: boot_config::PAGES_PER_ROW,
        slot_a: SlotConfig {
            flag: boot_config::SLOT_A_FLAG,
            image: boot_config::SLOT_A_IMAGE,
        },
        slot_b: SlotConfig {
            flag: boot_config::SLOT_B_FLAG,
            image: boot_config::SLOT_B_IMAGE,
        },
        mount_retry_delay_ms: boot_config::MOUNT_RETRY_DELAY_MS,
        exit_delay_ms: boot_config::EXIT_DELAY_MS,
        launch_policy: boot_config::LAUNCH_POLICY,
    }
}

#[entry]
fn main() -> ! {
    info!("sdboot starting...");

    let mut peripherals = unwrap!(pac::Peripherals::take());
    let core = unwrap!(pac::CorePeripherals::take());

    // 48 MHz from the DFLL; also sets the NVM wait states
    let mut clocks = GenericClockController::with_internal_32kosc(
        peripherals.gclk,
        &mut peripherals.pm,
        &mut peripherals.sysctrl,
        &mut peripherals.nvmctrl,
    );
    let pins = Pins::new(peripherals.port);

    // SD card on SERCOM4
    let gclk0 = clocks.gclk0();
    let sercom_clock = unwrap!(clocks.sercom4_core(&gclk0));
    let miso: Miso = pins.pa12.into();
    let mosi: Mosi = pins.pb10.into();
    let sclk: Sclk = pins.pb11.into();
    let pads = spi::Pads::default().data_in(miso).data_out(mosi).sclk(sclk);
    let bus = spi::Config::new(
        &peripherals.pm,
        peripherals.sercom4,
        pads,
        sercom_clock.freq(),
    )
    .baud(SD_BAUD_HZ.Hz())
    .spi_mode(spi::MODE_0)
    .enable();
    let cs = pins.pa08.into_push_pull_output();
    let device = match ExclusiveDevice::new_no_delay(bus, cs) {
        Ok(device) => device,
        Err(never) => match never {},
    };
    let card = SdCard::new(device, CycleDelay::new(boot_config::CORE_CLOCK_HZ));

    let storage = SdStorage::new(card, FixedTime);
    let nvm = Samd21Nvm::new(peripherals.nvmctrl);
    let crc = DsuCrc::new(peripherals.dsu, &peripherals.pac1);
    let launcher = CortexMLauncher::new(core.SCB, core.SYST, core.NVIC);

    let mut system = Samd21System::new(boot_config::CORE_CLOCK_HZ, || {
        // SAFETY: the SD card storage that owned SERCOM4 is never used
        // again once teardown runs
        reset_sercom(unsafe { &*pac::Sercom4::ptr() });
    });

    Bootloader::new(storage, nvm, crc, boot_config()).run(&mut system, launcher)
}
