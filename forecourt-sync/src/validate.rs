//! Archive content validation — the embedded station-code check.
//!
//! Archive exports carry an XML data entry whose global-parameters section
//! names the station that produced the file. Comparing that code against
//! the configured one catches exports copied to the wrong station before
//! they reach the server.
//!
//! The check is best-effort: an archive that cannot be opened or parsed is
//! `Inconclusive` and still gets uploaded. Only a code that was read
//! successfully and differs from the expected one blocks the upload.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

/// Section and element holding the embedded identity code.
const GLOBAL_PARAMS_TAG: &[u8] = b"GlobalParams";
const STATION_CODE_TAG: &[u8] = b"StationCode";

/// Outcome of the station-code check on one archive.
///
/// `Inconclusive` is deliberately distinct from `Matched`: "couldn't check"
/// must never be conflated with "checked and passed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationCheck {
    /// The embedded code equals the expected one.
    Matched,
    /// The embedded code was read and differs from the expected one.
    Mismatched { found: String },
    /// The archive could not be checked; upload proceeds anyway.
    Inconclusive { reason: String },
}

/// Open the archive at `path`, find the first entry named `*.<data_ext>`,
/// and compare its embedded station code against `expected_code`.
///
/// Blocking; callers inside the async pipeline run it on a blocking thread.
pub fn station_check(path: &Path, data_ext: &str, expected_code: &str) -> StationCheck {
    let code = match extract_station_code(path, data_ext) {
        Ok(Some(code)) => code,
        Ok(None) => {
            return StationCheck::Inconclusive {
                reason: "no station code found in archive".to_string(),
            }
        }
        Err(reason) => return StationCheck::Inconclusive { reason },
    };

    if code == expected_code {
        StationCheck::Matched
    } else {
        StationCheck::Mismatched { found: code }
    }
}

/// Pull the station code out of the archive's data entry.
///
/// `Ok(None)` means the archive is well-formed but the entry or the code
/// element is absent; `Err` carries a human-readable reason for logs.
fn extract_station_code(path: &Path, data_ext: &str) -> Result<Option<String>, String> {
    let file = std::fs::File::open(path)
        .map_err(|e| format!("open {}: {e}", path.display()))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| format!("read archive: {e}"))?;

    let suffix = format!(".{}", data_ext.to_lowercase());
    let entry_name = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|e| e.name().to_owned()))
        .find(|name| name.to_lowercase().ends_with(&suffix));
    let Some(entry_name) = entry_name else {
        return Ok(None);
    };

    let mut entry = archive
        .by_name(&entry_name)
        .map_err(|e| format!("open entry {entry_name}: {e}"))?;
    let mut xml = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut xml)
        .map_err(|e| format!("read entry {entry_name}: {e}"))?;

    find_station_code(&xml).map_err(|e| format!("parse entry {entry_name}: {e}"))
}

/// Walk the XML once and return the first non-empty station code scoped
/// under the global-parameters section.
fn find_station_code(xml: &[u8]) -> Result<Option<String>, quick_xml::Error> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_global = false;
    let mut in_code = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.local_name();
                if name.as_ref() == GLOBAL_PARAMS_TAG {
                    in_global = true;
                } else if in_global && name.as_ref() == STATION_CODE_TAG {
                    in_code = true;
                }
            }
            Event::End(e) => {
                let name = e.local_name();
                if name.as_ref() == GLOBAL_PARAMS_TAG {
                    in_global = false;
                } else if name.as_ref() == STATION_CODE_TAG {
                    in_code = false;
                }
            }
            Event::Text(t) if in_code => {
                let text = t.unescape()?.trim().to_string();
                if !text.is_empty() {
                    return Ok(Some(text));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
