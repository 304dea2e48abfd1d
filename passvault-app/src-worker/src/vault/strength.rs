use serde::Serialize;

/// Coarse password rating shown next to the password field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Strength {
    VeryWeak,
    Weak,
    Medium,
    Strong,
    VeryStrong,
}

/// Length over 6 and over 10 count one point each, an uppercase letter and
/// a digit half a point each, and a symbol one point.
///
/// Returns `None` for an empty password.
pub fn rate_password(password: &str) -> Option<Strength> {
    if password.is_empty() {
        return None;
    }

    let length = password.chars().count();
    let mut halves = 0u32;
    if length > 6 {
        halves += 2;
    }
    if length > 10 {
        halves += 2;
    }
    if password.chars().any(|c| c.is_ascii_uppercase()) {
        halves += 1;
    }
    if password.chars().any(|c| c.is_ascii_digit()) {
        halves += 1;
    }
    if password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        halves += 2;
    }

    Some(match halves / 2 {
        0 => Strength::VeryWeak,
        1 => Strength::Weak,
        2 => Strength::Medium,
        3 => Strength::Strong,
        _ => Strength::VeryStrong,
    })
}
