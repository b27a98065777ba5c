use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stored or submitted code that does not name any known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Closed set of string codes with a user-facing label, stored as TEXT and
/// exchanged on the wire by code.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => ($code:literal, $label:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $code)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($code => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum! {
    /// Publication state of a listing. `Blocked` is reserved for moderators.
    pub enum ListingStatus {
        Draft => ("draft", "Чернетка"),
        Published => ("published", "Опубліковано"),
        Archived => ("archived", "Архів"),
        Blocked => ("blocked", "Заблоковано"),
    }
}

impl Default for ListingStatus {
    fn default() -> Self {
        Self::Published
    }
}

string_enum! {
    pub enum Heating {
        Individual => ("individual", "Індивідуальне"),
        Central => ("central", "Централізоване"),
        Building => ("building", "Будинкове"),
        Other => ("other", "Інше"),
    }
}

string_enum! {
    pub enum Pets {
        Allowed => ("allowed", "Можна з тваринами"),
        CatsOnly => ("cats_only", "Можна з котами"),
        NotAllowed => ("not_allowed", "Не можна"),
        Negotiable => ("negotiable", "По домовленості"),
    }
}

string_enum! {
    pub enum Rooms {
        One => ("1", "1"),
        Two => ("2", "2"),
        Three => ("3", "3"),
        FourPlus => ("4+", "4+"),
    }
}

string_enum! {
    /// Reason code a reporter picks when flagging a listing.
    pub enum ReportReason {
        Fraud => ("fraud", "Шахрайські дії"),
        Inappropriate => ("inappropriate", "Неприпустимий контент"),
        Spam => ("spam", "Спам або дубльоване оголошення"),
        FalseInfo => ("false_info", "Неправдива інформація"),
        Other => ("other", "Інше"),
    }
}

string_enum! {
    /// Moderation state of a listing report.
    ///
    /// `Pending` is the only state without a reviewer; every other state
    /// records who reviewed the report and when.
    pub enum ModerationStatus {
        Pending => ("pending", "Нова"),
        InReview => ("in_review", "На розгляді"),
        Approved => ("approved", "Підтверджено"),
        Rejected => ("rejected", "Відхилено"),
    }
}

impl Default for ModerationStatus {
    fn default() -> Self {
        Self::Pending
    }
}

string_enum! {
    pub enum NotificationType {
        SiteUpdate => ("site_update", "Оновлення сайту"),
        Maintenance => ("maintenance", "Технічні роботи"),
        ReportResult => ("report_result", "Результат скарги"),
        Other => ("other", "Інше"),
    }
}

impl Default for NotificationType {
    fn default() -> Self {
        Self::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_parse_back_to_their_variant() {
        for status in ModerationStatus::ALL {
            assert_eq!(status.as_str().parse::<ModerationStatus>(), Ok(*status));
        }
        assert_eq!("4+".parse::<Rooms>(), Ok(Rooms::FourPlus));
        assert_eq!("cats_only".parse::<Pets>(), Ok(Pets::CatsOnly));
    }

    #[test]
    fn unknown_code_is_rejected() {
        let err = "banned".parse::<ListingStatus>().unwrap_err();
        assert_eq!(err.kind, "ListingStatus");
        assert_eq!(err.value, "banned");
    }

    #[test]
    fn serde_uses_the_stored_code() {
        let json = serde_json::to_string(&ReportReason::FalseInfo).unwrap();
        assert_eq!(json, "\"false_info\"");
        let back: ModerationStatus = serde_json::from_str("\"in_review\"").unwrap();
        assert_eq!(back, ModerationStatus::InReview);
    }
}
