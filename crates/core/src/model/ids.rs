use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing an id from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    kind: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {} from string", self.kind)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new id from its raw value.
            #[must_use]
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the underlying u64 value.
            #[must_use]
            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<u64>().map($name::new).map_err(|_| ParseIdError {
                    kind: stringify!($name),
                })
            }
        }
    };
}

id_type!(
    /// Unique identifier for a user.
    UserId
);
id_type!(
    /// Unique identifier for a course.
    CourseId
);
id_type!(
    /// Unique identifier for a quiz.
    QuizId
);
id_type!(
    /// Unique identifier for a question.
    QuestionId
);
id_type!(
    /// Unique identifier for a sitting.
    SittingId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiz_id_display() {
        let id = QuizId::new(42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn question_id_from_str() {
        let id: QuestionId = "123".parse().unwrap();
        assert_eq!(id, QuestionId::new(123));
    }

    #[test]
    fn user_id_from_str_invalid() {
        let result = "not-a-number".parse::<UserId>();
        assert!(result.is_err());
    }

    #[test]
    fn sitting_id_roundtrip() {
        let original = SittingId::new(7);
        let deserialized: SittingId = original.to_string().parse().unwrap();
        assert_eq!(original, deserialized);
    }

    #[test]
    fn course_id_debug_names_the_type() {
        assert_eq!(format!("{:?}", CourseId::new(9)), "CourseId(9)");
    }
}
