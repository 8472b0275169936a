//! Serial UWB module line protocol.
//!
//! The module streams comma-separated ASCII lines once its shell mode is
//! active and a `lec` report has been requested:
//!
//! ```text
//! DIST,4,AN0,…,POS,1.52,0.73,0.10,95
//! ```
//!
//! Only `DIST` lines carry a position; the `POS` marker is followed by x, y,
//! z in **metres** plus an integer quality figure. Coordinates are converted
//! to the canonical millimetres here, at the ingestion boundary.

use rovos_types::RadioError;

use crate::transport::RawPosition;

/// The module prompt that asks for the next command.
pub const SHELL_PROMPT: &str = "dwm>";

/// Command requesting the periodic location report.
pub const LEC_COMMAND: &[u8] = b"lec\r";

/// Carriage return that wakes the module's UART shell.
pub const SHELL_WAKE: &[u8] = b"\r";

/// Parse one line of module output.
///
/// Returns `Ok(Some(_))` for a `DIST` line with a well-formed `POS` section,
/// `Ok(None)` for any other line (prompts, distance-only reports, chatter),
/// and [`RadioError::ReadMalformed`] when a `POS` section is present but its
/// fields do not parse.
pub fn parse_dist_line(line: &str) -> Result<Option<RawPosition>, RadioError> {
    let fields: Vec<&str> = line.trim().split(',').collect();
    if fields.first() != Some(&"DIST") {
        return Ok(None);
    }
    let Some(pos_index) = fields.iter().position(|f| *f == "POS") else {
        return Ok(None);
    };
    if fields.len() < pos_index + 4 {
        return Err(RadioError::ReadMalformed(format!(
            "POS section truncated: {line:?}"
        )));
    }
    let coord = |i: usize| -> Result<f64, RadioError> {
        fields[pos_index + i].parse::<f64>().map_err(|_| {
            RadioError::ReadMalformed(format!(
                "bad POS field {:?} in {line:?}",
                fields[pos_index + i]
            ))
        })
    };
    // Metres → canonical millimetres.
    Ok(Some(RawPosition {
        x_mm: coord(1)? * 1000.0,
        y_mm: coord(2)? * 1000.0,
        z_mm: coord(3)? * 1000.0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_position_line() {
        let line = "DIST,4,AN0,0F32,1.00,2.00,0.00,1.25,POS,1.52,0.73,0.10,95";
        let pos = parse_dist_line(line).unwrap().expect("has POS");
        assert!((pos.x_mm - 1520.0).abs() < 1e-9);
        assert!((pos.y_mm - 730.0).abs() < 1e-9);
        assert!((pos.z_mm - 100.0).abs() < 1e-9);
    }

    #[test]
    fn dist_without_pos_is_skipped() {
        let line = "DIST,2,AN0,0F32,1.00,2.00,0.00,1.25";
        assert_eq!(parse_dist_line(line).unwrap(), None);
    }

    #[test]
    fn prompt_line_is_skipped() {
        assert_eq!(parse_dist_line("dwm>").unwrap(), None);
    }

    #[test]
    fn non_dist_chatter_is_skipped() {
        assert_eq!(parse_dist_line("INF,booted").unwrap(), None);
        assert_eq!(parse_dist_line("").unwrap(), None);
    }

    #[test]
    fn truncated_pos_is_malformed() {
        let err = parse_dist_line("DIST,4,POS,1.0,2.0").unwrap_err();
        assert!(matches!(err, RadioError::ReadMalformed(_)));
    }

    #[test]
    fn non_numeric_pos_is_malformed() {
        let err = parse_dist_line("DIST,4,POS,abc,2.0,0.0,95").unwrap_err();
        assert!(matches!(err, RadioError::ReadMalformed(_)));
    }

    #[test]
    fn negative_coordinates_parse() {
        let pos = parse_dist_line("DIST,4,POS,-0.25,0.5,0.0,80")
            .unwrap()
            .unwrap();
        assert!((pos.x_mm + 250.0).abs() < 1e-9);
    }

    #[test]
    fn whitespace_is_tolerated() {
        let pos = parse_dist_line("  DIST,4,POS,1.0,1.0,0.0,90\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(pos.x_mm, 1000.0);
    }
}
