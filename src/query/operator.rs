use serde::{Deserialize, Serialize};

/// Comparison operators a clause can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    /// Case-insensitive pattern match (`$regex` with `$options: "i"`).
    Like,
}

// Longer suffixes first: ">=" must win over ">".
const SUFFIXES: &[(&str, CmpOp)] = &[
    (">=", CmpOp::Gte),
    ("<=", CmpOp::Lte),
    ("<>", CmpOp::Ne),
    ("!=", CmpOp::Ne),
    (">", CmpOp::Gt),
    ("<", CmpOp::Lt),
    ("%", CmpOp::Like),
    ("~", CmpOp::Like),
];

impl CmpOp {
    /// Wire operator key, e.g. `$gte`. `Like` maps to `$regex`.
    #[must_use]
    pub fn wire(self) -> &'static str {
        match self {
            Self::Eq => "$eq",
            Self::Ne => "$ne",
            Self::Gt => "$gt",
            Self::Gte => "$gte",
            Self::Lt => "$lt",
            Self::Lte => "$lte",
            Self::In => "$in",
            Self::Nin => "$nin",
            Self::Like => "$regex",
        }
    }

    /// Resolves an explicit operator token: symbolic (`">="`), word (`"gte"`)
    /// or wire (`"$gte"`) spelling. Unknown tokens yield `None`.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        let t = token.trim();
        let t = t.strip_prefix('$').unwrap_or(t);
        let op = match t.to_ascii_lowercase().as_str() {
            "" | "=" | "==" | "eq" => Self::Eq,
            "<>" | "!=" | "ne" => Self::Ne,
            ">" | "gt" => Self::Gt,
            ">=" | "gte" => Self::Gte,
            "<" | "lt" => Self::Lt,
            "<=" | "lte" => Self::Lte,
            "in" => Self::In,
            "nin" | "not in" => Self::Nin,
            "%" | "~" | "like" | "regex" => Self::Like,
            _ => return None,
        };
        Some(op)
    }
}

/// Splits a field token into its bare field name and the comparison operator
/// implied by its suffix (`"age>="` → `("age", Gte)`). Tokens without a known
/// suffix compare for equality. A token made only of a suffix yields an empty
/// field name.
#[must_use]
pub fn parse_operator(token: &str) -> (&str, CmpOp) {
    let trimmed = token.trim_end();
    for (suffix, op) in SUFFIXES {
        if let Some(field) = trimmed.strip_suffix(suffix) {
            return (field.trim_end(), *op);
        }
    }
    (trimmed, CmpOp::Eq)
}
