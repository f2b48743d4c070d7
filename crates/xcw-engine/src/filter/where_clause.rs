use regex::Regex;
use xcw_types::{LogEntry, LogLevel};

use crate::error::{Error, Result};

/// Field a WHERE clause can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhereField {
    Level,
    Subsystem,
    Category,
    Process,
    Message,
    Pid,
}

impl WhereField {
    fn parse(s: &str) -> Option<WhereField> {
        match s.to_ascii_lowercase().as_str() {
            "level" => Some(WhereField::Level),
            "subsystem" => Some(WhereField::Subsystem),
            "category" => Some(WhereField::Category),
            "process" => Some(WhereField::Process),
            "message" => Some(WhereField::Message),
            "pid" => Some(WhereField::Pid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WhereOp {
    Eq,
    Ne,
    Matches,
    NotMatches,
    Prefix,
    Suffix,
    GteLevel,
    LteLevel,
}

/// One parsed `--where` condition, e.g. `level>=error` or `message~timeout`.
#[derive(Debug)]
pub struct WhereClause {
    field: WhereField,
    op: WhereOp,
    value: String,
    regex: Option<Regex>,
}

// Longest token first so `!=` never parses as `!` + `=` and `>=`/`<=`
// never lose their second character to a single-char operator.
const OPERATORS: &[(&str, WhereOp)] = &[
    ("!~", WhereOp::NotMatches),
    (">=", WhereOp::GteLevel),
    ("<=", WhereOp::LteLevel),
    ("!=", WhereOp::Ne),
    ("~", WhereOp::Matches),
    ("=", WhereOp::Eq),
    ("^", WhereOp::Prefix),
    ("$", WhereOp::Suffix),
];

impl WhereClause {
    pub fn parse(clause: &str) -> Result<WhereClause> {
        for (token, op) in OPERATORS {
            if let Some(idx) = clause.find(token) {
                if idx == 0 {
                    continue;
                }
                let field_str = clause[..idx].trim();
                let value = clause[idx + token.len()..].trim();
                if field_str.is_empty() || value.is_empty() {
                    return Err(Error::InvalidWhere(clause.to_string()));
                }

                let field = WhereField::parse(field_str).ok_or_else(|| {
                    Error::InvalidWhere(format!("unknown field '{}' in '{}'", field_str, clause))
                })?;

                if matches!(op, WhereOp::GteLevel | WhereOp::LteLevel)
                    && field != WhereField::Level
                {
                    return Err(Error::InvalidWhere(format!(
                        "operator '{}' only applies to level, got '{}'",
                        token, clause
                    )));
                }

                let regex = if matches!(op, WhereOp::Matches | WhereOp::NotMatches) {
                    Some(Regex::new(value).map_err(|source| Error::InvalidWhereRegex {
                        clause: clause.to_string(),
                        source,
                    })?)
                } else {
                    None
                };

                return Ok(WhereClause {
                    field,
                    op: *op,
                    value: value.to_string(),
                    regex,
                });
            }
        }

        Err(Error::InvalidWhere(format!(
            "no valid operator found in '{}' (use =, !=, ~, !~, >=, <=, ^, $)",
            clause
        )))
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        let field_value = self.field_value(entry);

        match self.op {
            WhereOp::Eq => field_value == self.value,
            WhereOp::Ne => field_value != self.value,
            WhereOp::Matches => self
                .regex
                .as_ref()
                .map(|re| re.is_match(&field_value))
                .unwrap_or(false),
            WhereOp::NotMatches => self
                .regex
                .as_ref()
                .map(|re| !re.is_match(&field_value))
                .unwrap_or(true),
            WhereOp::Prefix => field_value.starts_with(&self.value),
            WhereOp::Suffix => field_value.ends_with(&self.value),
            WhereOp::GteLevel => {
                entry.level.priority() >= LogLevel::parse(&self.value).priority()
            }
            WhereOp::LteLevel => {
                entry.level.priority() <= LogLevel::parse(&self.value).priority()
            }
        }
    }

    fn field_value(&self, entry: &LogEntry) -> String {
        match self.field {
            WhereField::Level => entry.level.as_str().to_string(),
            WhereField::Subsystem => entry.subsystem.clone(),
            WhereField::Category => entry.category.clone(),
            WhereField::Process => entry.process.clone(),
            WhereField::Message => entry.message.clone(),
            WhereField::Pid => entry.pid.to_string(),
        }
    }
}

/// AND-conjunction of WHERE clauses.
#[derive(Debug)]
pub struct WhereFilter {
    clauses: Vec<WhereClause>,
}

impl WhereFilter {
    /// Returns `None` when no clauses are given, mirroring the "null
    /// pipeline admits everything" rule.
    pub fn parse(clauses: &[String]) -> Result<Option<WhereFilter>> {
        if clauses.is_empty() {
            return Ok(None);
        }
        let clauses = clauses
            .iter()
            .map(|c| WhereClause::parse(c))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(WhereFilter { clauses }))
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.clauses.iter().all(|clause| clause.matches(entry))
    }
}
