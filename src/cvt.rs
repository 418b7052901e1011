//! VESA CVT mode timing synthesis.
//!
//! Hosted outputs only ever carry one mode, generated from the width, height
//! and refresh rate the compositor reports. The generated timings follow the
//! coordinated video timings formula with no margins and no interlacing.

use crate::server::ModeInfo;

/// Character cell granularity in pixels.
const H_GRANULARITY: i32 = 8;
/// Minimum vertical front porch in lines.
const MIN_V_PORCH: i32 = 3;
/// Minimum vertical sync + back porch time in µs.
const MIN_VSYNC_BP: f64 = 550.0;
/// Nominal horizontal sync duty cycle in percent.
const HSYNC_PERCENT: f64 = 8.0;
/// Blanking formula gradient (M' = 600 * 128 / 256).
const M_PRIME: f64 = 300.0;
/// Blanking formula offset (C' = (40 - 20) * 128 / 256 + 20).
const C_PRIME: f64 = 30.0;
/// Pixel clock granularity in kHz.
const CLOCK_STEP: f64 = 250.0;

/// Generates a CVT mode for the given resolution and refresh rate.
///
/// The horizontal resolution is rounded down to the character cell, so the
/// resulting mode can be narrower than requested (1366 becomes 1360). Callers
/// that need the exact reported resolution overwrite the mode dimensions
/// afterwards.
pub fn generate_mode(width: i32, height: i32, refresh: f64) -> ModeInfo {
    let refresh = if (1.0..=1000.0).contains(&refresh) {
        refresh
    } else {
        60.0
    };

    let hdisplay = width - width % H_GRANULARITY;
    let vdisplay = height;

    // Sync width depends on the aspect ratio.
    let vsync = if vdisplay * 4 / 3 == hdisplay {
        4
    } else if vdisplay * 16 / 9 == hdisplay {
        5
    } else if vdisplay * 16 / 10 == hdisplay {
        6
    } else if vdisplay % 4 == 0 && vdisplay * 5 / 4 == hdisplay {
        7
    } else if vdisplay * 15 / 9 == hdisplay {
        7
    } else {
        10
    };

    // Estimated horizontal period in µs.
    let h_period = ((1_000_000.0 / refresh) - MIN_VSYNC_BP) / (vdisplay + MIN_V_PORCH) as f64;

    // Lines taken by the vertical sync and back porch.
    let est = (MIN_VSYNC_BP / h_period) as i32 + 1;
    let vsync_bp = est.max(vsync + MIN_V_PORCH);
    let vtotal = vdisplay + vsync_bp + MIN_V_PORCH;

    // Ideal blanking duty cycle, clamped to the formula's 20% floor.
    let duty = (C_PRIME - M_PRIME * h_period / 1000.0).max(20.0);
    let mut hblank = (hdisplay as f64 * duty / (100.0 - duty)) as i32;
    hblank -= hblank % (2 * H_GRANULARITY);

    let htotal = hdisplay + hblank;
    let mut hsync = (htotal as f64 * HSYNC_PERCENT / 100.0) as i32;
    hsync -= hsync % H_GRANULARITY;
    let hsync_end = hdisplay + hblank / 2;
    let hsync_start = hsync_end - hsync;

    let vsync_start = vdisplay + MIN_V_PORCH;
    let vsync_end = vsync_start + vsync;

    let mut clock = htotal as f64 * 1000.0 / h_period;
    clock -= clock % CLOCK_STEP;

    let refresh_millihz = (clock * 1_000_000.0 / (htotal as f64 * vtotal as f64)) as u32;

    ModeInfo {
        name: format!("{hdisplay}x{vdisplay}"),
        width: hdisplay as u16,
        height: vdisplay as u16,
        clock_khz: clock as u32,
        hsync_start: hsync_start as u16,
        hsync_end: hsync_end as u16,
        htotal: htotal as u16,
        vsync_start: vsync_start as u16,
        vsync_end: vsync_end as u16,
        vtotal: vtotal as u16,
        refresh_millihz,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn xga_at_60() {
        // 63.50  1024 1072 1176 1328  768 771 775 798
        let mode = generate_mode(1024, 768, 60.0);
        assert_eq!(mode.name, "1024x768");
        assert_eq!(mode.width, 1024);
        assert_eq!(mode.height, 768);
        assert_eq!(mode.clock_khz, 63_500);
        assert_eq!(mode.hsync_start, 1072);
        assert_eq!(mode.hsync_end, 1176);
        assert_eq!(mode.htotal, 1328);
        assert_eq!(mode.vsync_start, 771);
        assert_eq!(mode.vsync_end, 775);
        assert_eq!(mode.vtotal, 798);
    }

    #[test]
    fn odd_width_rounds_down_to_cell() {
        let mode = generate_mode(1366, 768, 60.0);
        assert_eq!(mode.width, 1360);
        assert_eq!(mode.name, "1360x768");
    }

    #[test]
    fn refresh_close_to_nominal() {
        for &(w, h, r) in &[(1280, 1024, 60.0), (1920, 1080, 60.0), (2560, 1440, 75.0)] {
            let mode = generate_mode(w, h, r);
            assert_relative_eq!(mode.refresh_millihz as f64 / 1000.0, r, max_relative = 0.01);
        }
    }

    #[test]
    fn nonsense_refresh_falls_back_to_60() {
        let mode = generate_mode(1024, 768, 0.0);
        assert_relative_eq!(mode.refresh_millihz as f64 / 1000.0, 60.0, max_relative = 0.01);
    }
}
