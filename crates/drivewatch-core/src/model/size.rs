/// Capacity formatting for drive listings.
///
/// All sizes are `u64` bytes. Floating point is only used at the
/// display-formatting boundary.
use super::drive_item::VolumeSpace;

/// Format a byte count with a binary unit (KiB = 1024), labelled with the
/// short forms users expect (KB, MB, GB, TB).
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    const TB: f64 = GB * 1024.0;

    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else if b < GB {
        format!("{:.1} MB", b / MB)
    } else if b < TB {
        format!("{:.2} GB", b / GB)
    } else {
        format!("{:.2} TB", b / TB)
    }
}

/// Used share of the volume, 0.0–100.0. Zero-capacity volumes report 0.
pub fn usage_percent(space: &VolumeSpace) -> f32 {
    if space.total_bytes == 0 {
        return 0.0;
    }
    (space.used_bytes() as f64 / space.total_bytes as f64 * 100.0) as f32
}

/// "12.50 GB free of 64.00 GB"
pub fn format_space(space: &VolumeSpace) -> String {
    format!(
        "{} free of {}",
        format_size(space.free_bytes),
        format_size(space.total_bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1_048_576), "1.0 MB");
        assert_eq!(format_size(1_073_741_824), "1.00 GB");
        assert_eq!(format_size(1_099_511_627_776), "1.00 TB");
    }

    #[test]
    fn test_usage_percent() {
        let half = VolumeSpace {
            total_bytes: 200,
            free_bytes: 100,
        };
        assert!((usage_percent(&half) - 50.0).abs() < f32::EPSILON);

        let empty = VolumeSpace {
            total_bytes: 0,
            free_bytes: 0,
        };
        assert_eq!(usage_percent(&empty), 0.0);
    }

    #[test]
    fn test_format_space() {
        let space = VolumeSpace {
            total_bytes: 2 * 1_073_741_824,
            free_bytes: 1_073_741_824,
        };
        assert_eq!(format_space(&space), "1.00 GB free of 2.00 GB");
    }
}
