use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;

/// Parse a newline-delimited numeric series, ignoring blank/comment lines.
pub fn parse_series<T>(text: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: T = trimmed
            .parse()
            .with_context(|| format!("line {} is not a valid number: {}", idx + 1, trimmed))?;
        out.push(val);
    }
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

/// Raw ADC samples, one per line.
pub fn parse_samples(text: &str) -> Result<Vec<u16>> {
    parse_series(text)
}

/// Peak-to-peak intervals in milliseconds, one per line.
pub fn parse_intervals(text: &str) -> Result<Vec<f64>> {
    parse_series(text)
}

pub fn read_samples(path: &Path) -> Result<Vec<u16>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_samples(&text)
}

pub fn read_intervals(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_intervals(&text)
}

/// Write samples one per line.
pub fn write_samples(path: &Path, samples: &[u16]) -> Result<()> {
    let mut text = String::with_capacity(samples.len() * 6);
    for sample in samples {
        text.push_str(&sample.to_string());
        text.push('\n');
    }
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_blanks() {
        let text = "# ppi export\n800\n\n 810 \n790.5\n";
        assert_eq!(parse_intervals(text).unwrap(), vec![800.0, 810.0, 790.5]);
    }

    #[test]
    fn reports_offending_line() {
        let err = parse_samples("100\n70000\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(parse_samples("# nothing\n").is_err());
    }

    #[test]
    fn samples_survive_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ppg.txt");
        write_samples(&path, &[0, 32_768, 65_535]).unwrap();
        assert_eq!(read_samples(&path).unwrap(), vec![0, 32_768, 65_535]);
    }
}
