//! Small utility helpers used across modules.

/// Final path segment of an audio URL, used as the asset reference for
/// readiness polling ("/data/audio/q42.mp3" -> "q42.mp3").
pub fn audio_filename(url: &str) -> &str {
  url.rsplit('/').next().unwrap_or(url)
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads. The cut is
/// clamped to a char boundary so multi-byte text never panics the slice.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}
