//! Human-readable byte sizes for progress messages.

const MAGNITUDES: [&str; 5] = ["bytes", "KiB", "MiB", "GiB", "TiB"];

/// Render a byte count with three significant digits, e.g. `1.21 KiB`.
pub fn readable_size(bytes: u64) -> String {
    let mut count = bytes as f64;
    let mut magnitude = 0;
    while count > 1024.0 && magnitude < MAGNITUDES.len() - 1 {
        count /= 1024.0;
        magnitude += 1;
    }

    let unit = MAGNITUDES[magnitude];
    if magnitude == 0 {
        format!("{bytes} {unit}")
    } else if count < 10.0 {
        format!("{count:.2} {unit}")
    } else if count < 100.0 {
        format!("{count:.1} {unit}")
    } else {
        format!("{count:.0} {unit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readable_size() {
        assert_eq!(readable_size(0), "0 bytes");
        assert_eq!(readable_size(1024), "1024 bytes");
        assert_eq!(readable_size(1240), "1.21 KiB");
        assert_eq!(readable_size(50 * 1024), "50.0 KiB");
        assert_eq!(readable_size(300 * 1024 * 1024), "300 MiB");
    }
}
