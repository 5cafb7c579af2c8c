//! ffprobe output parsing.

use super::TranscodeError;
use vidhost_core::models::Resolution;

/// Native dimensions of the first video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub width: u32,
    pub height: u32,
}

impl ProbeResult {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Parse `-show_entries stream=width,height -of csv=p=0` output, e.g. `1280,720`.
pub fn parse_probe_output(output: &str) -> Result<ProbeResult, TranscodeError> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| TranscodeError::NoVideoStream("ffprobe reported no video stream".to_string()))?;

    let mut fields = line.split(',').map(str::trim);
    let width = parse_dimension(fields.next(), line)?;
    let height = parse_dimension(fields.next(), line)?;
    Ok(ProbeResult { width, height })
}

fn parse_dimension(field: Option<&str>, line: &str) -> Result<u32, TranscodeError> {
    field
        .and_then(|f| f.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .ok_or_else(|| TranscodeError::NoVideoStream(format!("unexpected ffprobe output: {:?}", line)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_width_and_height() {
        let probe = parse_probe_output("1280,720\n").unwrap();
        assert_eq!(probe.resolution(), Resolution::new(1280, 720));
    }

    #[test]
    fn tolerates_trailing_separator_and_blank_lines() {
        let probe = parse_probe_output("\n1920,1080,\n").unwrap();
        assert_eq!(probe, ProbeResult { width: 1920, height: 1080 });
    }

    #[test]
    fn rejects_empty_and_garbage_output() {
        assert!(matches!(parse_probe_output(""), Err(TranscodeError::NoVideoStream(_))));
        assert!(matches!(parse_probe_output("N/A,N/A"), Err(TranscodeError::NoVideoStream(_))));
        assert!(matches!(parse_probe_output("0,720"), Err(TranscodeError::NoVideoStream(_))));
    }
}
