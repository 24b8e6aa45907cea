use std::fmt;

use serde::{Deserialize, Serialize};

/// An identifier for a door.
///
/// Defined by the door's configuration key, i.e. [doors.identifier-here]
///
/// Also used to save the door's last state.
#[derive(Debug, Serialize, Deserialize, Hash, PartialEq, Eq, Clone)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
  /// A filesystem friendly form of the identifier, used as the persistence key.
  ///
  /// Lowercased, with every run of characters outside `[a-z0-9]` collapsed into a single `-`.
  pub fn slug(&self) -> String {
    let mut slug = String::with_capacity(self.0.len());
    let mut in_separator = false;
    for c in self.0.to_lowercase().chars() {
      if c.is_ascii_lowercase() || c.is_ascii_digit() {
        slug.push(c);
        in_separator = false;
      }
      else if !in_separator {
        slug.push('-');
        in_separator = true;
      }
    }
    slug
  }
}

impl From<String> for Identifier {
  fn from(string: String) -> Self {
    Identifier(string)
  }
}

impl From<&str> for Identifier {
  fn from(string: &str) -> Self {
    Identifier(string.to_owned())
  }
}

impl fmt::Display for Identifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slug_collapses_separators() {
    assert_eq!(Identifier::from("Main Garage").slug(), "main-garage");
    assert_eq!(Identifier::from("Side  door #2").slug(), "side-door-2");
    assert_eq!(Identifier::from("Shed!").slug(), "shed-");
  }

  #[test]
  fn slug_keeps_plain_keys() {
    assert_eq!(Identifier::from("garage").slug(), "garage");
  }
}
