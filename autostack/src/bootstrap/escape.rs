//! Escaping of interpolated values for each destination syntax in the bootstrap templates

use std::fmt::Write;

/// Characters that never need quoting in a shell word
fn is_shell_safe(c: char) -> bool {
  c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '@' | '%' | '+' | ',' | '=')
}

/// Quote a value as a single shell word
///
/// Safe words are returned as-is, anything else is single quoted. Values carrying
/// control characters use ANSI-C quoting so that no literal newline ever reaches the
/// script, which keeps heredoc terminators out of reach of the value
pub fn shell_word(value: &str) -> String {
  if !value.is_empty() && value.chars().all(is_shell_safe) {
    return value.to_owned();
  }

  if !value.chars().any(char::is_control) {
    return format!("'{}'", value.replace('\'', r"'\''"));
  }

  let mut quoted = String::from("$'");
  for c in value.chars() {
    match c {
      '\\' => quoted.push_str(r"\\"),
      '\'' => quoted.push_str(r"\'"),
      '\n' => quoted.push_str(r"\n"),
      '\r' => quoted.push_str(r"\r"),
      '\t' => quoted.push_str(r"\t"),
      c if c.is_control() => {
        let _ = write!(quoted, r"\u{:04x}", c as u32);
      }
      c => quoted.push(c),
    }
  }
  quoted.push('\'');
  quoted
}

/// Encode a value as a YAML double-quoted scalar
///
/// Every character outside the YAML printable set, plus the line breaks YAML folds
/// (`NEL`, `LS`, `PS`), is written as an escape sequence
pub fn yaml_scalar(value: &str) -> String {
  let mut quoted = String::from("\"");
  for c in value.chars() {
    match c {
      '"' => quoted.push_str(r#"\""#),
      '\\' => quoted.push_str(r"\\"),
      '\0' => quoted.push_str(r"\0"),
      '\t' => quoted.push_str(r"\t"),
      '\n' => quoted.push_str(r"\n"),
      '\r' => quoted.push_str(r"\r"),
      '\u{85}' => quoted.push_str(r"\N"),
      '\u{2028}' => quoted.push_str(r"\L"),
      '\u{2029}' => quoted.push_str(r"\P"),
      c if c.is_control() => {
        let _ = write!(quoted, r"\x{:02X}", c as u32);
      }
      '\u{fffe}' | '\u{ffff}' => {
        let _ = write!(quoted, r"\u{:04X}", c as u32);
      }
      c => quoted.push(c),
    }
  }
  quoted.push('"');
  quoted
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use rstest::*;

  use super::*;

  #[rstest]
  #[case("k3s.example.com", "k3s.example.com")]
  #[case("s3://valheim-123/valheim-data/", "s3://valheim-123/valheim-data/")]
  #[case("", "''")]
  #[case("two words", "'two words'")]
  #[case("$(reboot)", "'$(reboot)'")]
  #[case("it's", r"'it'\''s'")]
  #[case("a\nb", r"$'a\nb'")]
  #[case("x'\n", r"$'x\'\n'")]
  #[case("tab\there", r"$'tab\there'")]
  fn shell_word_test(#[case] value: &str, #[case] expected: &str) {
    assert_eq!(expected, shell_word(value));
  }

  #[test]
  fn shell_word_never_emits_newlines() {
    let quoted = shell_word("pw\nUSER_CMDS\nrm -rf /");
    assert!(!quoted.contains('\n'));
    insta::assert_snapshot!(quoted, @r"$'pw\nUSER_CMDS\nrm -rf /'");
  }

  #[rstest]
  #[case("hunter2", r#""hunter2""#)]
  #[case(r#"say "hi""#, r#""say \"hi\"""#)]
  #[case("line\nbreak", r#""line\nbreak""#)]
  #[case("# not a comment: {}", r##""# not a comment: {}""##)]
  #[case("pw\u{7f}x", r#""pw\x7Fx""#)]
  #[case("pw\u{9c}x", r#""pw\x9Cx""#)]
  #[case("pw\u{85}x", r#""pw\Nx""#)]
  #[case("pw\u{2028}x\u{2029}", r#""pw\Lx\P""#)]
  #[case("bell\u{7}", r#""bell\x07""#)]
  #[case("é🎮", "\"é🎮\"")]
  fn yaml_scalar_test(#[case] value: &str, #[case] expected: &str) {
    assert_eq!(expected, yaml_scalar(value));
  }

  #[rstest]
  #[case("hunter2")]
  #[case(r#"say "hi" \ bye"#)]
  #[case("line\nbreak\r\n")]
  #[case("tab\there\0")]
  #[case("pw\u{7f}x")]
  #[case("pw\u{9c}x")]
  #[case("pw\u{85}x")]
  #[case("pw\u{2028}x")]
  #[case("pw\u{2029}x")]
  #[case("bell\u{7}\u{1b}[0m")]
  #[case("é🎮")]
  fn yaml_scalar_parses_back(#[case] value: &str) {
    let document = format!("serverPass: {}\n", yaml_scalar(value));
    let parsed: BTreeMap<String, String> = serde_yaml::from_str(&document).unwrap();

    assert_eq!(parsed["serverPass"], value);
  }
}
