//! Building a [`StreamRegistry`] from stream-list files and inline
//! selection strings.

use std::path::Path;

use slink_protocol::selector::split_selectors;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::registry::StreamRegistry;

/// Read a stream-list file: one `NET STA [selectors...]` entry per
/// line, `#` and `*` starting comments, blank lines ignored.
///
/// `default_selectors` apply to entries that list none of their own.
/// Returns the number of entries added.
pub fn read_stream_list(
    registry: &mut StreamRegistry,
    path: impl AsRef<Path>,
    default_selectors: Option<&str>,
) -> Result<usize> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;

    let mut added = 0;
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('*') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let (Some(net), Some(sta)) = (fields.next(), fields.next()) else {
            return Err(EngineError::ConfigInvalid(format!(
                "{}:{}: expected 'NET STA [selectors...]', got {line:?}",
                path.display(),
                lineno + 1
            )));
        };

        let rest = fields.collect::<Vec<_>>().join(" ");
        let selectors = effective_selectors(&rest, default_selectors)?;
        registry.add_stream(net, sta, selectors, None, "")?;
        added += 1;
    }

    debug!(path = %path.display(), added, "stream list loaded");
    Ok(added)
}

/// Parse an inline stream list: `NET_STA[:selectors],...`, e.g.
/// `"IU_KONO:BHE BHN,GE_WLF,MN_AQU:HH?.D"`.
///
/// Returns the number of entries added.
pub fn parse_stream_list(
    registry: &mut StreamRegistry,
    list: &str,
    default_selectors: Option<&str>,
) -> Result<usize> {
    let mut added = 0;

    for item in list.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }

        let (stream, selectors_str) = match item.split_once(':') {
            Some((stream, sel)) => (stream, sel),
            None => (item, ""),
        };

        let Some((net, sta)) = stream.split_once('_') else {
            return Err(EngineError::ConfigInvalid(format!(
                "expected NET_STA in stream list, got {stream:?}"
            )));
        };
        if net.is_empty() || sta.is_empty() {
            return Err(EngineError::ConfigInvalid(format!(
                "empty network or station in {stream:?}"
            )));
        }

        let selectors = effective_selectors(selectors_str, default_selectors)?;
        registry.add_stream(net, sta, selectors, None, "")?;
        added += 1;
    }

    if added == 0 {
        return Err(EngineError::ConfigInvalid("empty stream list".into()));
    }
    Ok(added)
}

fn effective_selectors(own: &str, default: Option<&str>) -> Result<Vec<String>> {
    let own = own.trim();
    let chosen = if own.is_empty() {
        default.unwrap_or("")
    } else {
        own
    };
    Ok(split_selectors(chosen)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_list() {
        let mut registry = StreamRegistry::new();
        let added =
            parse_stream_list(&mut registry, "IU_KONO:BHE BHN,GE_WLF,MN_AQU:HH?.D", None).unwrap();
        assert_eq!(added, 3);

        let entries: Vec<_> = registry.iter().collect();
        assert_eq!(entries[0].net, "IU");
        assert_eq!(entries[0].sta, "KONO");
        assert_eq!(entries[0].selectors, ["BHE", "BHN"]);
        assert_eq!(entries[1].net, "GE");
        assert!(entries[1].selectors.is_empty());
        assert_eq!(entries[2].selectors, ["HH?.D"]);
    }

    #[test]
    fn inline_list_default_selectors() {
        let mut registry = StreamRegistry::new();
        parse_stream_list(&mut registry, "IU_KONO,GE_WLF:LHZ", Some("BHZ")).unwrap();

        let entries: Vec<_> = registry.iter().collect();
        assert_eq!(entries[0].selectors, ["BHZ"]);
        assert_eq!(entries[1].selectors, ["LHZ"]);
    }

    #[test]
    fn inline_list_rejects_bad_shape() {
        let mut registry = StreamRegistry::new();
        assert!(parse_stream_list(&mut registry, "KONO", None).is_err());
        assert!(parse_stream_list(&mut registry, "_KONO", None).is_err());
        assert!(parse_stream_list(&mut registry, "", None).is_err());
    }

    #[test]
    fn file_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streams");
        std::fs::write(
            &path,
            "# comment\n\
             * another comment style\n\
             IU ANMO BHZ LHZ\n\
             \n\
             GE WLF\n",
        )
        .unwrap();

        let mut registry = StreamRegistry::new();
        let added = read_stream_list(&mut registry, &path, Some("HHZ")).unwrap();
        assert_eq!(added, 2);

        let entries: Vec<_> = registry.iter().collect();
        assert_eq!(entries[0].selectors, ["BHZ", "LHZ"]);
        assert_eq!(entries[1].selectors, ["HHZ"]);
    }

    #[test]
    fn file_list_rejects_single_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streams");
        std::fs::write(&path, "ANMO\n").unwrap();

        let mut registry = StreamRegistry::new();
        assert!(matches!(
            read_stream_list(&mut registry, &path, None),
            Err(EngineError::ConfigInvalid(_))
        ));
    }
}
