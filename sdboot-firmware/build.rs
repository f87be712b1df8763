//! Build script for sdboot-firmware
//!
//! - Validates boot.toml at compile time
//! - Generates the compiled-in configuration constants
//! - Generates memory.x so the bootloader image ends at the application base

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// SAMD21 flash starts at address 0, SRAM at 0x2000_0000
const FLASH_ORIGIN: u64 = 0x0000_0000;
const RAM_ORIGIN: u64 = 0x2000_0000;

/// Largest row the core's row buffer holds
const MAX_ROW_SIZE: u64 = 4096;

/// Validated boot.toml contents
struct BootToml {
    flash_size: u64,
    ram_size: u64,
    page_size: u64,
    core_clock_hz: u64,
    app_base: u64,
    pages_per_row: u64,
    slot_a: (String, String),
    slot_b: (String, String),
    mount_retry_delay_ms: u64,
    exit_delay_ms: u64,
    policy: &'static str,
}

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let config = load_config();

    write_config(&out_dir, &config);
    write_memory_x(&out_dir, &config);

    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Print a boxed build error and abort
fn fail(title: &str, lines: &[String]) -> ! {
    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<56} ║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title,
        lines
            .iter()
            .map(|line| format_line(line))
            .collect::<Vec<_>>()
            .join("\n")
    );
}

fn format_line(line: &str) -> String {
    let truncated = if line.len() > 62 {
        format!("{}...", &line[..59])
    } else {
        line.to_string()
    };
    format!("║  • {:<62} ║", truncated)
}

/// Read, parse and validate boot.toml
fn load_config() -> BootToml {
    println!("cargo:rerun-if-changed=boot.toml");

    let path = Path::new("boot.toml");
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => fail("Failed to read boot.toml", &[e.to_string()]),
    };

    let value: toml::Value = match toml::from_str(&content) {
        Ok(value) => value,
        Err(e) => fail(
            "Invalid TOML syntax in boot.toml",
            &e.to_string().lines().map(String::from).collect::<Vec<_>>(),
        ),
    };

    let mut errors = Vec::new();
    let config = BootToml {
        flash_size: integer(&value, &["board", "flash_size"], &mut errors),
        ram_size: integer(&value, &["board", "ram_size"], &mut errors),
        page_size: integer(&value, &["board", "page_size"], &mut errors),
        core_clock_hz: integer(&value, &["board", "core_clock_hz"], &mut errors),
        app_base: integer(&value, &["layout", "app_base"], &mut errors),
        pages_per_row: integer(&value, &["layout", "pages_per_row"], &mut errors),
        slot_a: slot(&value, "a", &mut errors),
        slot_b: slot(&value, "b", &mut errors),
        mount_retry_delay_ms: integer(&value, &["timing", "mount_retry_delay_ms"], &mut errors),
        exit_delay_ms: integer(&value, &["timing", "exit_delay_ms"], &mut errors),
        policy: policy(&value, &mut errors),
    };
    if !errors.is_empty() {
        fail("Missing or invalid keys in boot.toml", &errors);
    }

    validate_layout(&config);
    println!("cargo:warning=boot.toml validated successfully");
    config
}

fn lookup<'a>(value: &'a toml::Value, path: &[&str]) -> Option<&'a toml::Value> {
    path.iter().try_fold(value, |value, key| value.get(key))
}

fn integer(value: &toml::Value, path: &[&str], errors: &mut Vec<String>) -> u64 {
    match lookup(value, path).and_then(toml::Value::as_integer) {
        Some(n) if (0..=u32::MAX as i64).contains(&n) => n as u64,
        Some(n) => {
            errors.push(format!("{} = {} is not a 32-bit value", path.join("."), n));
            0
        }
        None => {
            errors.push(format!("{} must be an integer", path.join(".")));
            0
        }
    }
}

fn string(value: &toml::Value, path: &[&str], errors: &mut Vec<String>) -> String {
    match lookup(value, path).and_then(toml::Value::as_str) {
        Some(s) => s.to_string(),
        None => {
            errors.push(format!("{} must be a string", path.join(".")));
            String::new()
        }
    }
}

fn slot(value: &toml::Value, name: &str, errors: &mut Vec<String>) -> (String, String) {
    let flag = string(value, &["slot", name, "flag"], errors);
    let image = string(value, &["slot", name, "image"], errors);
    for file in [&flag, &image] {
        if !file.is_empty() && !is_short_name(file) {
            errors.push(format!("slot.{}: \"{}\" is not an 8.3 file name", name, file));
        }
    }
    (flag, image)
}

fn policy(value: &toml::Value, errors: &mut Vec<String>) -> &'static str {
    match string(value, &["launch", "policy"], errors).as_str() {
        "always" => "Always",
        "require-verified" => "RequireVerified",
        "" => "Always",
        other => {
            errors.push(format!(
                "launch.policy \"{}\" must be \"always\" or \"require-verified\"",
                other
            ));
            "Always"
        }
    }
}

/// FAT short name: up to 8 characters, optional dot and up to 3 more
fn is_short_name(name: &str) -> bool {
    let (base, ext) = name.split_once('.').unwrap_or((name, ""));
    let valid = |part: &str| {
        part.chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-~!#$%&'()@^`{}".contains(c))
    };
    !base.is_empty() && base.len() <= 8 && ext.len() <= 3 && valid(base) && valid(ext)
}

fn validate_layout(config: &BootToml) {
    let mut errors = Vec::new();
    let row_size = config.page_size * config.pages_per_row;

    if config.page_size == 0 || !config.page_size.is_power_of_two() {
        errors.push(format!("board.page_size {} must be a power of two", config.page_size));
    }
    if config.pages_per_row == 0 || config.pages_per_row > 32 {
        errors.push("layout.pages_per_row must be between 1 and 32".to_string());
    }
    if row_size > MAX_ROW_SIZE {
        errors.push(format!("row size {} exceeds the {} byte row buffer", row_size, MAX_ROW_SIZE));
    }
    if config.app_base == 0 {
        errors.push("layout.app_base must leave room for the bootloader".to_string());
    }
    if row_size != 0 && config.app_base % row_size != 0 {
        errors.push(format!(
            "layout.app_base {:#x} is not aligned to the {} byte row",
            config.app_base, row_size
        ));
    }
    if config.app_base >= config.flash_size {
        errors.push(format!(
            "layout.app_base {:#x} lies outside {:#x} bytes of flash",
            config.app_base, config.flash_size
        ));
    }
    if config.core_clock_hz < 1000 {
        errors.push("board.core_clock_hz must be at least 1 kHz".to_string());
    }
    if config.slot_a.0 == config.slot_b.0 {
        errors.push("slot.a and slot.b must use different flag files".to_string());
    }

    if !errors.is_empty() {
        fail("Invalid layout in boot.toml", &errors);
    }
}

/// Emit the configuration as Rust constants
fn write_config(out_dir: &Path, config: &BootToml) {
    let source = format!(
        "// Generated from boot.toml by build.rs\n\
        pub const CORE_CLOCK_HZ: u32 = {core_clock_hz};\n\
        pub const APP_BASE: u32 = {app_base:#x};\n\
        pub const PAGES_PER_ROW: u32 = {pages_per_row};\n\
        pub const SLOT_A_FLAG: &str = {slot_a_flag:?};\n\
        pub const SLOT_A_IMAGE: &str = {slot_a_image:?};\n\
        pub const SLOT_B_FLAG: &str = {slot_b_flag:?};\n\
        pub const SLOT_B_IMAGE: &str = {slot_b_image:?};\n\
        pub const MOUNT_RETRY_DELAY_MS: u32 = {mount_retry_delay_ms};\n\
        pub const EXIT_DELAY_MS: u32 = {exit_delay_ms};\n\
        pub const LAUNCH_POLICY: sdboot_core::LaunchPolicy = sdboot_core::LaunchPolicy::{policy};\n",
        core_clock_hz = config.core_clock_hz,
        app_base = config.app_base,
        pages_per_row = config.pages_per_row,
        slot_a_flag = config.slot_a.0,
        slot_a_image = config.slot_a.1,
        slot_b_flag = config.slot_b.0,
        slot_b_image = config.slot_b.1,
        mount_retry_delay_ms = config.mount_retry_delay_ms,
        exit_delay_ms = config.exit_delay_ms,
        policy = config.policy,
    );
    fs::write(out_dir.join("boot_config.rs"), source).unwrap();
}

/// Bootloader FLASH stops at the application base
fn write_memory_x(out_dir: &Path, config: &BootToml) {
    let memory_x = format!(
        "/* Generated from boot.toml by build.rs */\n\
        MEMORY\n\
        {{\n  \
          FLASH : ORIGIN = {:#010x}, LENGTH = {:#x}\n  \
          RAM : ORIGIN = {:#010x}, LENGTH = {:#x}\n\
        }}\n",
        FLASH_ORIGIN,
        config.app_base - FLASH_ORIGIN,
        RAM_ORIGIN,
        config.ram_size,
    );
    fs::write(out_dir.join("memory.x"), memory_x).unwrap();
}
