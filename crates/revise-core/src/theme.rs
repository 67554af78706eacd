use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
  #[default]
  Light,
  Dark,
  EyeCare
}

/// ANSI SGR codes used by the
/// terminal renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
  pub accent:  &'static str,
  pub muted:   &'static str,
  pub done:    &'static str,
  pub pending: &'static str,
  pub today:   &'static str
}

impl Theme {
  pub const ALL: [Theme; 3] = [
    Theme::Light,
    Theme::Dark,
    Theme::EyeCare
  ];

  pub fn storage_value(
    self
  ) -> &'static str {
    match self {
      | Self::Light => "light",
      | Self::Dark => "dark",
      | Self::EyeCare => "eye-care"
    }
  }

  /// Unknown values fall back to
  /// light.
  pub fn from_storage(
    raw: &str
  ) -> Self {
    raw.parse().unwrap_or_default()
  }

  pub fn display_name(
    self
  ) -> &'static str {
    match self {
      | Self::Light => "浅色",
      | Self::Dark => "深色",
      | Self::EyeCare => "护眼"
    }
  }

  pub fn palette(self) -> Palette {
    match self {
      | Self::Light => Palette {
        accent:  "34",
        muted:   "90",
        done:    "32",
        pending: "31",
        today:   "1;7"
      },
      | Self::Dark => Palette {
        accent:  "96",
        muted:   "37",
        done:    "92",
        pending: "91",
        today:   "1;30;107"
      },
      | Self::EyeCare => Palette {
        accent:  "32",
        muted:   "33",
        done:    "92",
        pending: "33",
        today:   "1;30;102"
      }
    }
  }
}

impl fmt::Display for Theme {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.storage_value())
  }
}

impl FromStr for Theme {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "light" => Ok(Self::Light),
      | "dark" => Ok(Self::Dark),
      | "eye-care" | "eyecare" => {
        Ok(Self::EyeCare)
      }
      | other => Err(anyhow!(
        "unknown theme: {other} \
         (expected light, dark or \
         eye-care)"
      ))
    }
  }
}
