use std::{env, fs, path::PathBuf};

use cfg_aliases::cfg_aliases;

/// Crystal or external clock on OSC_IN, in Hz.
const DEFAULT_HSE_HZ: u32 = 8_000_000;
/// Watch crystal on OSC32_IN, in Hz.
const DEFAULT_LSE_HZ: u32 = 32_768;

fn board_freq(var: &str, default: u32) -> u32 {
    println!("cargo:rerun-if-env-changed={var}");
    match env::var(var) {
        Ok(val) => val
            .trim()
            .replace('_', "")
            .parse()
            .unwrap_or_else(|_| panic!("{var} must be a frequency in Hz, got `{val}`")),
        Err(_) => default,
    }
}

fn main() {
    cfg_aliases! {
        // A PAC is available, so the register backend for real hardware can be built.
        hw: { any(feature = "ms32f030", feature = "ms32f031", feature = "ms32f051", feature = "ms32f072") },
    }

    let hse = board_freq("MS32F0_HSE_HZ", DEFAULT_HSE_HZ);
    let lse = board_freq("MS32F0_LSE_HZ", DEFAULT_LSE_HZ);

    let out = PathBuf::from(env::var("OUT_DIR").unwrap()).join("board.rs");
    fs::write(
        out,
        format!(
            "/// HSE frequency populated on the board, in Hz.\n\
             pub const HSE_FREQ: u32 = {hse};\n\
             /// LSE frequency populated on the board, in Hz.\n\
             pub const LSE_FREQ: u32 = {lse};\n"
        ),
    )
    .unwrap();
}
