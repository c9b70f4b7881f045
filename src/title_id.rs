//! Title-id extraction and sanitation.
//!
//! History entries carry the raw launched-title bytes as written by the
//! console; mid-write snapshots can contain garbage, so everything funnels
//! through [`sanitize`] before it reaches a downstream consumer.

use lazy_static::lazy_static;
use regex::Regex;

/// Canonical form `XXXX_nnn.nn`, e.g. `SLUS_203.12`.
pub const TITLE_ID_LEN: usize = 11;

lazy_static! {
    static ref TITLE_ID_RE: Regex = Regex::new(r"^[A-Z]{4}_\d{3}\.\d{2}$").unwrap();
}

/// Pulls a candidate title id out of a raw entry span.
///
/// Takes the printable prefix up to the first NUL, non-graphic byte, or
/// version separator (`;`), capped at [`TITLE_ID_LEN`]. Ids recorded in the
/// dotless on-card form (`SLUS_20312`) are normalized to the canonical form.
pub fn extract(raw: &[u8]) -> Option<String> {
    let mut id = String::with_capacity(TITLE_ID_LEN);
    for &b in raw {
        if b == 0 || b == b';' || !b.is_ascii_graphic() {
            break;
        }
        id.push(b as char);
        if id.len() == TITLE_ID_LEN {
            break;
        }
    }
    if id.is_empty() {
        return None;
    }
    if id.len() == TITLE_ID_LEN - 1 && !id.contains('.') {
        id.insert(TITLE_ID_LEN - 3, '.');
    }
    Some(id)
}

/// Validity check against the title-id grammar.
pub fn is_valid(id: &str) -> bool {
    TITLE_ID_RE.is_match(id)
}

/// Extraction plus validity check; `None` for anything that does not parse as
/// a well-formed title id.
pub fn sanitize(raw: &[u8]) -> Option<String> {
    extract(raw).filter(|id| is_valid(id))
}
