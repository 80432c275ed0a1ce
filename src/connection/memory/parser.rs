use crate::core::{DbError, Result, Value};
use sqlparser::ast as sql_ast;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};

/// Transaction-control statements, handled by the session rather than the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Begin,
    Commit,
    Rollback,
}

#[derive(Debug, Clone)]
pub(crate) enum StatementKind {
    Control(Control),
    Sql(sql_ast::Statement),
}

/// One statement of a script and the text it was written as, minus comments.
#[derive(Debug, Clone)]
pub(crate) struct ParsedStatement {
    pub text: String,
    pub kind: StatementKind,
}

impl ParsedStatement {
    pub fn control(&self) -> Option<Control> {
        match self.kind {
            StatementKind::Control(control) => Some(control),
            StatementKind::Sql(_) => None,
        }
    }
}

/// Splits a script on top-level `;` and parses every statement.
///
/// The tokenizer keeps quoted strings, `$tag$` bodies and comments intact,
/// so only real statement separators split. Either the whole script parses
/// or nothing is returned, the way the server rejects a simple query.
pub(crate) fn parse_script(script: &str) -> Result<Vec<ParsedStatement>> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, script.trim_start_matches('\u{feff}'))
        .tokenize()
        .map_err(|e| syntax_error(e.to_string()))?;

    let mut statements = Vec::new();
    let mut current = Vec::new();
    for token in tokens {
        match token {
            Token::SemiColon => {
                statements.extend(parse_segment(&dialect, std::mem::take(&mut current))?);
            }
            Token::EOF => {}
            Token::Whitespace(
                Whitespace::SingleLineComment { .. } | Whitespace::MultiLineComment(_),
            ) => current.push(Token::Whitespace(Whitespace::Space)),
            other => current.push(other),
        }
    }
    statements.extend(parse_segment(&dialect, current)?);

    Ok(statements)
}

fn parse_segment(dialect: &PostgreSqlDialect, tokens: Vec<Token>) -> Result<Option<ParsedStatement>> {
    let text = tokens.iter().map(Token::to_string).collect::<String>();
    let text = text.trim().to_string();
    if text.is_empty() {
        return Ok(None);
    }

    // Spellings the parser does not know, such as ABORT.
    if let Some(control) = classify_control(&text) {
        return Ok(Some(ParsedStatement {
            text,
            kind: StatementKind::Control(control),
        }));
    }

    let mut parsed = Parser::new(dialect)
        .with_tokens(tokens)
        .parse_statements()
        .map_err(|e| syntax_error(e.to_string()))?;
    let statement = match (parsed.pop(), parsed.is_empty()) {
        (Some(statement), true) => statement,
        _ => return Err(syntax_error(format!("expected one statement in \"{}\"", text))),
    };

    let kind = match statement {
        sql_ast::Statement::StartTransaction { .. } => StatementKind::Control(Control::Begin),
        sql_ast::Statement::Commit { .. } => StatementKind::Control(Control::Commit),
        sql_ast::Statement::Rollback { .. } => StatementKind::Control(Control::Rollback),
        other => StatementKind::Sql(other),
    };

    Ok(Some(ParsedStatement { text, kind }))
}

fn classify_control(text: &str) -> Option<Control> {
    let normalized = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase();

    match normalized.as_str() {
        "BEGIN" | "BEGIN TRANSACTION" | "BEGIN WORK" | "START TRANSACTION" => Some(Control::Begin),
        "COMMIT" | "COMMIT TRANSACTION" | "COMMIT WORK" | "END" | "END TRANSACTION" | "END WORK" => {
            Some(Control::Commit)
        }
        "ROLLBACK" | "ROLLBACK TRANSACTION" | "ROLLBACK WORK" | "ABORT" | "ABORT TRANSACTION"
        | "ABORT WORK" => Some(Control::Rollback),
        _ => None,
    }
}

/// `pg_try_advisory_lock` / `pg_advisory_unlock` with two `hashtext` keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AdvisoryCall {
    pub acquire: bool,
    pub key: (String, String),
    pub column: String,
}

pub(crate) fn advisory_call(statement: &sql_ast::Statement, params: &[&str]) -> Result<Option<AdvisoryCall>> {
    let sql_ast::Statement::Query(query) = statement else {
        return Ok(None);
    };
    let sql_ast::SetExpr::Select(select) = query.body.as_ref() else {
        return Ok(None);
    };
    if !select.from.is_empty() || select.projection.len() != 1 {
        return Ok(None);
    }

    let (expr, alias) = match &select.projection[0] {
        sql_ast::SelectItem::UnnamedExpr(expr) => (expr, None),
        sql_ast::SelectItem::ExprWithAlias { expr, alias } => (expr, Some(ident_name(alias))),
        _ => return Ok(None),
    };
    let sql_ast::Expr::Function(func) = expr else {
        return Ok(None);
    };

    let function = function_name(func);
    let acquire = match function.as_str() {
        "pg_try_advisory_lock" => true,
        "pg_advisory_unlock" => false,
        _ => return Ok(None),
    };

    let args = function_args(func)?;
    let [first, second] = args.as_slice() else {
        return Err(unsupported(format!("{} with {} arguments", function, args.len())));
    };

    Ok(Some(AdvisoryCall {
        acquire,
        key: (hashtext_key(first, params)?, hashtext_key(second, params)?),
        column: alias.unwrap_or(function),
    }))
}

fn hashtext_key(expr: &sql_ast::Expr, params: &[&str]) -> Result<String> {
    let sql_ast::Expr::Function(func) = expr else {
        return Err(unsupported("advisory lock keys other than hashtext(...)"));
    };
    match (function_name(func).as_str(), function_args(func)?.as_slice()) {
        ("hashtext", [arg]) => Ok(constant(arg, params)?.to_string()),
        _ => Err(unsupported("advisory lock keys other than hashtext(...)")),
    }
}

/// Evaluates a literal, a parameter or a cast of one.
fn constant(expr: &sql_ast::Expr, params: &[&str]) -> Result<Value> {
    match expr {
        sql_ast::Expr::Value(value) => literal(&value.value, params),
        sql_ast::Expr::Cast { expr, .. } | sql_ast::Expr::Nested(expr) => constant(expr, params),
        other => Err(unsupported(format!("expression {}", other))),
    }
}

pub(crate) fn literal(value: &sql_ast::Value, params: &[&str]) -> Result<Value> {
    match value {
        sql_ast::Value::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Value::Integer(i))
            } else if let Ok(f) = n.parse::<f64>() {
                Ok(Value::Float(f))
            } else {
                Err(syntax_error(format!("invalid number {}", n)))
            }
        }
        sql_ast::Value::SingleQuotedString(s) | sql_ast::Value::EscapedStringLiteral(s) => {
            Ok(Value::Text(s.clone()))
        }
        sql_ast::Value::DollarQuotedString(s) => Ok(Value::Text(s.value.clone())),
        sql_ast::Value::Boolean(b) => Ok(Value::Boolean(*b)),
        sql_ast::Value::Null => Ok(Value::Null),
        sql_ast::Value::Placeholder(placeholder) => {
            let position = placeholder
                .strip_prefix('$')
                .and_then(|p| p.parse::<usize>().ok())
                .ok_or_else(|| syntax_error(format!("unsupported placeholder {}", placeholder)))?;
            params
                .get(position.wrapping_sub(1))
                .map(|p| Value::from(*p))
                .ok_or_else(|| {
                    DbError::database(
                        "08P01",
                        format!(
                            "bind message supplies {} parameters, but statement requires {}",
                            params.len(),
                            position
                        ),
                    )
                })
        }
        other => Err(unsupported(format!("literal {}", other))),
    }
}

pub(crate) fn function_name(func: &sql_ast::Function) -> String {
    name_parts(&func.name.to_string()).pop().unwrap_or_default()
}

pub(crate) fn function_args(func: &sql_ast::Function) -> Result<Vec<&sql_ast::Expr>> {
    match &func.args {
        sql_ast::FunctionArguments::None => Ok(Vec::new()),
        sql_ast::FunctionArguments::List(list) => list
            .args
            .iter()
            .map(|arg| match arg {
                sql_ast::FunctionArg::Unnamed(sql_ast::FunctionArgExpr::Expr(expr)) => Ok(expr),
                _ => Err(unsupported("named or wildcard function arguments")),
            })
            .collect(),
        sql_ast::FunctionArguments::Subquery(_) => Err(unsupported("subquery arguments")),
    }
}

/// Unquoted identifiers fold to lower case.
pub(crate) fn ident_name(ident: &sql_ast::Ident) -> String {
    match ident.quote_style {
        Some(_) => ident.value.clone(),
        None => ident.value.to_ascii_lowercase(),
    }
}

/// Splits a rendered, possibly qualified name on `.` outside double quotes.
pub(crate) fn name_parts(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quote = false;

    let mut chars = name.trim().chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quote && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => {
                in_quote = !in_quote;
                quoted = true;
            }
            '.' if !in_quote => {
                parts.push(finish_part(&mut current, quoted));
                quoted = false;
            }
            _ => current.push(ch),
        }
    }
    parts.push(finish_part(&mut current, quoted));

    parts
}

fn finish_part(current: &mut String, quoted: bool) -> String {
    let part = std::mem::take(current);
    if quoted { part } else { part.trim().to_ascii_lowercase() }
}

/// `(schema, table)` for a table reference; unqualified names live in `public`.
pub(crate) fn relation(name: &impl ToString) -> (String, String) {
    let mut parts = name_parts(&name.to_string());
    let table = parts.pop().unwrap_or_default();
    let schema = parts.pop().unwrap_or_else(|| "public".to_string());
    (schema, table)
}

pub(crate) fn syntax_error(message: impl Into<String>) -> DbError {
    DbError::database("42601", format!("syntax error: {}", message.into()))
}

pub(crate) fn unsupported(what: impl Into<String>) -> DbError {
    DbError::database("0A000", format!("{} is not supported", what.into()))
}
