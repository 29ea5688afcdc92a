use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use driveup_protocol::constants::REMOTE_SEPARATOR;

/// Bytes escaped inside one path segment.
///
/// `%` is in the set so an already-escaped triple in a file name stays data.
/// `:` would otherwise terminate the path part of an item address. Space,
/// `#` and `?` would break the surrounding URL. `'`, `(`, `)`, `[` and `]`
/// are literal in item paths and pass through.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Escapes a relative path for inclusion in a path-addressed item locator.
///
/// Both `/` and `\` are treated as separators and emitted as `/`. Never fails.
pub fn encode_path(relative: &str) -> String {
    relative
        .split(['/', '\\'])
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Joins an optional unescaped prefix and a relative child path with a single
/// separator, dropping empty segments at the seam.
pub fn join_remote_path(prefix: Option<&str>, child: &str) -> String {
    let child = child.trim_start_matches(['/', '\\']);
    match prefix.map(|p| p.trim_matches(['/', '\\'])) {
        Some(p) if !p.is_empty() => format!("{p}{REMOTE_SEPARATOR}{child}"),
        _ => child.to_string(),
    }
}
