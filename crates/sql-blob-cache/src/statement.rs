//! Named-placeholder SQL templates rendered into dialect statements
//!
//! Templates use `:name` placeholders. Scalar parameters render as one
//! positional placeholder in the target dialect's syntax; list parameters
//! expand into a comma-joined run of placeholders sized to the list, which is
//! how variable-arity `IN (...)` clauses are built without string
//! concatenation. Templates are tokenized rather than rewritten textually, so
//! `:key` can never match inside `:keys`.

use crate::error::{CacheError, Result};

/// A bindable parameter value. The kind is chosen by the caller at the
/// key/payload boundary, never inferred from runtime inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Null,
    Text(String),
    Blob(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
enum ParamValue {
    Scalar(Value),
    List(Vec<Value>),
}

/// Ordered name → value bindings for one template.
#[derive(Debug, Default)]
pub struct Params {
    entries: Vec<(String, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.entries.push((name.into(), ParamValue::Scalar(value)));
    }

    pub fn push_list(&mut self, name: impl Into<String>, values: Vec<Value>) {
        self.entries.push((name.into(), ParamValue::List(values)));
    }

    fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Placeholder syntax of the target SQL engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
}

impl Dialect {
    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index + 1),
            Dialect::MySql => "?".to_string(),
        }
    }
}

/// An executable statement: final SQL plus positional arguments in bind order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

#[derive(Debug, PartialEq)]
enum Token<'a> {
    Sql(&'a str),
    Param(&'a str),
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn tokenize(template: &str) -> Vec<Token<'_>> {
    let bytes = template.as_bytes();
    let mut tokens = Vec::new();
    let mut run_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b':' {
            // `::` is cast syntax, keep it in the SQL run
            if i + 1 < bytes.len() && bytes[i + 1] == b':' {
                i += 2;
                continue;
            }
            let name_start = i + 1;
            let mut name_end = name_start;
            while name_end < bytes.len() && is_name_byte(bytes[name_end]) {
                name_end += 1;
            }
            if name_end > name_start {
                if run_start < i {
                    tokens.push(Token::Sql(&template[run_start..i]));
                }
                tokens.push(Token::Param(&template[name_start..name_end]));
                i = name_end;
                run_start = name_end;
                continue;
            }
        }
        i += 1;
    }

    if run_start < bytes.len() {
        tokens.push(Token::Sql(&template[run_start..]));
    }

    tokens
}

/// Render a template into a dialect statement.
///
/// Fails on a placeholder with no parameter, a parameter the template never
/// references, or an empty list parameter (which would produce `IN ()`).
pub fn build(template: &str, params: &Params, dialect: Dialect) -> Result<Statement> {
    let mut sql = String::with_capacity(template.len());
    let mut args: Vec<Value> = Vec::new();
    let mut used: Vec<&str> = Vec::new();

    for token in tokenize(template) {
        match token {
            Token::Sql(text) => sql.push_str(text),
            Token::Param(name) => {
                let value = params.get(name).ok_or_else(|| {
                    CacheError::Statement(format!("unknown placeholder `:{}`", name))
                })?;
                match value {
                    ParamValue::Scalar(v) => {
                        sql.push_str(&dialect.placeholder(args.len()));
                        args.push(v.clone());
                    }
                    ParamValue::List(values) => {
                        if values.is_empty() {
                            return Err(CacheError::Statement(format!(
                                "list parameter `{}` is empty",
                                name
                            )));
                        }
                        for (i, v) in values.iter().enumerate() {
                            if i > 0 {
                                sql.push_str(", ");
                            }
                            sql.push_str(&dialect.placeholder(args.len()));
                            args.push(v.clone());
                        }
                    }
                }
                if !used.contains(&name) {
                    used.push(name);
                }
            }
        }
    }

    if let Some((name, _)) = params.entries.iter().find(|(n, _)| !used.contains(&n.as_str())) {
        return Err(CacheError::Statement(format!(
            "parameter `{}` is not referenced in the template",
            name
        )));
    }

    Ok(Statement { sql, args })
}

/// Placeholder group for one row of a multi-row `VALUES` list. Dialect
/// adapters join these to batch an upsert into a single statement.
pub fn row_placeholders(index: usize) -> String {
    format!("(:key_{index}, :data_{index}, :expires_{index})")
}
