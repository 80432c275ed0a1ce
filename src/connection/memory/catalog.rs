use super::parser::{
    function_name, ident_name, literal, name_parts, relation, syntax_error, unsupported,
};
use super::transaction::Change;
use crate::core::{DbError, Result, Row, Value};
use crate::result::QueryResult;
use sqlparser::ast as sql_ast;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// `(schema, table)`, both already case-folded.
pub(crate) type TableKey = (String, String);

#[derive(Debug, Clone)]
pub(crate) struct Table {
    columns: Vec<String>,
    primary_key: Option<usize>,
    rows: Vec<Row>,
}

impl Table {
    fn column(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DbError::database("42703", format!("column \"{}\" does not exist", name)))
    }

    /// Position of a row with the same primary key as `row`.
    fn conflicting(&self, row: &Row) -> Option<usize> {
        let pk = self.primary_key?;
        self.rows.iter().position(|r| values_equal(&r[pk], &row[pk]))
    }

    fn has_duplicate_key(&self) -> bool {
        let Some(pk) = self.primary_key else {
            return false;
        };
        self.rows.iter().enumerate().any(|(i, a)| {
            self.rows[i + 1..]
                .iter()
                .any(|b| values_equal(&a[pk], &b[pk]))
        })
    }
}

/// Every schema and table of an in-memory database.
#[derive(Debug, Clone)]
pub(crate) struct Catalog {
    schemas: BTreeSet<String>,
    tables: BTreeMap<TableKey, Table>,
}

impl Catalog {
    pub fn new() -> Self {
        let mut schemas = BTreeSet::new();
        schemas.insert("public".to_string());
        Self {
            schemas,
            tables: BTreeMap::new(),
        }
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.schemas.contains(&name.to_ascii_lowercase())
    }

    pub fn has_table(&self, schema: &str, table: &str) -> bool {
        self.tables
            .contains_key(&(schema.to_ascii_lowercase(), table.to_ascii_lowercase()))
    }

    pub fn rows(&self, schema: &str, table: &str) -> Option<Vec<Row>> {
        self.tables
            .get(&(schema.to_ascii_lowercase(), table.to_ascii_lowercase()))
            .map(|t| t.rows.clone())
    }

    /// Runs one statement, recording every effect in `changes`.
    pub fn execute(
        &mut self,
        statement: &sql_ast::Statement,
        params: &[&str],
        changes: &mut Vec<Change>,
    ) -> Result<QueryResult> {
        match statement {
            sql_ast::Statement::CreateSchema {
                schema_name,
                if_not_exists,
                ..
            } => match schema_name {
                sql_ast::SchemaName::Simple(name) => {
                    let name = name_parts(&name.to_string()).pop().unwrap_or_default();
                    self.create_schema(name, *if_not_exists, changes)
                }
                _ => Err(unsupported("CREATE SCHEMA ... AUTHORIZATION")),
            },
            sql_ast::Statement::Drop {
                object_type,
                if_exists,
                names,
                cascade,
                ..
            } => {
                for name in names {
                    match object_type {
                        sql_ast::ObjectType::Schema => {
                            let name = name_parts(&name.to_string()).pop().unwrap_or_default();
                            self.drop_schema(name, *if_exists, *cascade, changes)?;
                        }
                        sql_ast::ObjectType::Table => {
                            self.drop_table(relation(name), *if_exists, changes)?;
                        }
                        other => return Err(unsupported(format!("DROP {}", other))),
                    }
                }
                Ok(QueryResult::empty())
            }
            sql_ast::Statement::CreateTable(create) => self.create_table(create, changes),
            sql_ast::Statement::Insert(insert) => self.insert(insert, params, changes),
            sql_ast::Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => self.update(table, assignments, selection.as_ref(), params, changes),
            sql_ast::Statement::Delete(delete) => self.delete(delete, params, changes),
            sql_ast::Statement::Query(query) => self.query(query, params),
            other => Err(unsupported(format!("statement {}", other))),
        }
    }

    /// Replays a change recorded against an older copy of this catalog.
    ///
    /// Fails when the state the change was made against is gone, e.g. a row
    /// another session updated or deleted since.
    pub fn apply(&mut self, change: &Change) -> Result<()> {
        match change {
            Change::CreateSchema(name) => {
                if !self.schemas.insert(name.clone()) {
                    return Err(serialization_failure());
                }
            }
            Change::DropSchema(name) => {
                if !self.schemas.remove(name) {
                    return Err(serialization_failure());
                }
                self.tables.retain(|(schema, _), _| schema != name);
            }
            Change::CreateTable { key, table } => {
                if !self.schemas.contains(&key.0) || self.tables.contains_key(key) {
                    return Err(serialization_failure());
                }
                self.tables.insert(key.clone(), table.clone());
            }
            Change::DropTable(key) => {
                if self.tables.remove(key).is_none() {
                    return Err(serialization_failure());
                }
            }
            Change::InsertRow { key, row } => {
                let table = self.tables.get_mut(key).ok_or_else(serialization_failure)?;
                if table.conflicting(row).is_some() {
                    return Err(serialization_failure());
                }
                table.rows.push(row.clone());
            }
            Change::UpdateRow { key, old, new } => {
                let table = self.tables.get_mut(key).ok_or_else(serialization_failure)?;
                let pos = table
                    .rows
                    .iter()
                    .position(|r| r == old)
                    .ok_or_else(serialization_failure)?;
                table.rows[pos] = new.clone();
                if table.has_duplicate_key() {
                    return Err(serialization_failure());
                }
            }
            Change::DeleteRow { key, row } => {
                let table = self.tables.get_mut(key).ok_or_else(serialization_failure)?;
                let pos = table
                    .rows
                    .iter()
                    .position(|r| r == row)
                    .ok_or_else(serialization_failure)?;
                table.rows.remove(pos);
            }
        }
        Ok(())
    }

    fn create_schema(&mut self, name: String, if_not_exists: bool, changes: &mut Vec<Change>) -> Result<QueryResult> {
        if self.schemas.contains(&name) {
            if if_not_exists {
                return Ok(QueryResult::empty());
            }
            return Err(DbError::database(
                "42P06",
                format!("schema \"{}\" already exists", name),
            ));
        }
        self.schemas.insert(name.clone());
        changes.push(Change::CreateSchema(name));
        Ok(QueryResult::empty())
    }

    fn drop_schema(
        &mut self,
        name: String,
        if_exists: bool,
        cascade: bool,
        changes: &mut Vec<Change>,
    ) -> Result<()> {
        if !self.schemas.contains(&name) {
            if if_exists {
                return Ok(());
            }
            return Err(DbError::database(
                "3F000",
                format!("schema \"{}\" does not exist", name),
            ));
        }

        let has_tables = self.tables.keys().any(|(schema, _)| *schema == name);
        if has_tables && !cascade {
            return Err(DbError::database(
                "2BP01",
                format!("cannot drop schema {} because other objects depend on it", name),
            ));
        }

        self.tables.retain(|(schema, _), _| *schema != name);
        self.schemas.remove(&name);
        changes.push(Change::DropSchema(name));
        Ok(())
    }

    fn drop_table(&mut self, key: TableKey, if_exists: bool, changes: &mut Vec<Change>) -> Result<()> {
        if self.tables.remove(&key).is_some() {
            changes.push(Change::DropTable(key));
        } else if !if_exists {
            return Err(missing_relation(&key.1));
        }
        Ok(())
    }

    fn create_table(&mut self, create: &sql_ast::CreateTable, changes: &mut Vec<Change>) -> Result<QueryResult> {
        let key = relation(&create.name);
        if !self.schemas.contains(&key.0) {
            return Err(DbError::database(
                "3F000",
                format!("schema \"{}\" does not exist", key.0),
            ));
        }
        if self.tables.contains_key(&key) {
            if create.if_not_exists {
                return Ok(QueryResult::empty());
            }
            return Err(DbError::database(
                "42P07",
                format!("relation \"{}\" already exists", key.1),
            ));
        }

        let mut columns = Vec::new();
        let mut primary_key_column = None;
        for column in &create.columns {
            let name = ident_name(&column.name);
            if column
                .options
                .iter()
                .any(|def| def.option.to_string().starts_with("PRIMARY KEY"))
            {
                primary_key_column = Some(name.clone());
            }
            columns.push(name);
        }
        for constraint in &create.constraints {
            if let Some(column) = primary_key_column_of(&constraint.to_string()) {
                primary_key_column = Some(column);
            }
        }

        let primary_key = match primary_key_column {
            Some(pk) => Some(columns.iter().position(|c| *c == pk).ok_or_else(|| {
                DbError::database(
                    "42703",
                    format!("column \"{}\" named in key does not exist", pk),
                )
            })?),
            None => None,
        };

        let table = Table {
            columns,
            primary_key,
            rows: Vec::new(),
        };
        self.tables.insert(key.clone(), table.clone());
        changes.push(Change::CreateTable { key, table });
        Ok(QueryResult::empty())
    }

    fn insert(
        &mut self,
        insert: &sql_ast::Insert,
        params: &[&str],
        changes: &mut Vec<Change>,
    ) -> Result<QueryResult> {
        let key = relation(&insert.table);
        let table = self
            .tables
            .get_mut(&key)
            .ok_or_else(|| missing_relation(&key.1))?;

        let targets = if insert.columns.is_empty() {
            (0..table.columns.len()).collect()
        } else {
            insert
                .columns
                .iter()
                .map(|c| table.column(&ident_name(c)))
                .collect::<Result<Vec<_>>>()?
        };

        let Some(source) = &insert.source else {
            return Err(unsupported("INSERT without VALUES"));
        };
        let sql_ast::SetExpr::Values(values) = source.body.as_ref() else {
            return Err(unsupported("INSERT ... SELECT"));
        };

        let on_conflict = match &insert.on {
            None => None,
            Some(sql_ast::OnInsert::OnConflict(conflict)) => Some(&conflict.action),
            Some(_) => return Err(unsupported("ON DUPLICATE KEY")),
        };

        let mut affected = 0;
        for tuple in &values.rows {
            if tuple.len() != targets.len() {
                return Err(syntax_error(format!(
                    "INSERT has {} expressions for {} target columns",
                    tuple.len(),
                    targets.len()
                )));
            }

            let mut row = vec![Value::Null; table.columns.len()];
            for (idx, expr) in targets.iter().zip(tuple) {
                row[*idx] = eval(expr, &Scope::constant(params))?;
            }

            match (table.conflicting(&row), on_conflict) {
                (None, _) => {
                    table.rows.push(row.clone());
                    changes.push(Change::InsertRow {
                        key: key.clone(),
                        row,
                    });
                    affected += 1;
                }
                (Some(_), Some(sql_ast::OnConflictAction::DoNothing)) => {}
                (Some(pos), Some(sql_ast::OnConflictAction::DoUpdate(update))) => {
                    let old = table.rows[pos].clone();
                    let new = {
                        let scope = Scope {
                            table: Some(&*table),
                            row: Some(&old),
                            excluded: Some(&row),
                            params,
                        };
                        if !filter(update.selection.as_ref(), &scope)? {
                            continue;
                        }
                        let mut new = old.clone();
                        for assignment in &update.assignments {
                            let idx = table.column(&assignment_column(&assignment.target)?)?;
                            new[idx] = eval(&assignment.value, &scope)?;
                        }
                        new
                    };
                    table.rows[pos] = new.clone();
                    changes.push(Change::UpdateRow {
                        key: key.clone(),
                        old,
                        new,
                    });
                    affected += 1;
                }
                (Some(_), None) => return Err(duplicate_key(&key.1)),
            }
        }

        Ok(QueryResult::empty().with_rows_affected(affected))
    }

    fn update(
        &mut self,
        target: &sql_ast::TableWithJoins,
        assignments: &[sql_ast::Assignment],
        selection: Option<&sql_ast::Expr>,
        params: &[&str],
        changes: &mut Vec<Change>,
    ) -> Result<QueryResult> {
        let key = table_key(&target.relation)?;
        let table = self
            .tables
            .get_mut(&key)
            .ok_or_else(|| missing_relation(&key.1))?;

        let mut targets = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let idx = table.column(&assignment_column(&assignment.target)?)?;
            targets.push((idx, &assignment.value));
        }

        let mut updates = Vec::new();
        for (pos, row) in table.rows.iter().enumerate() {
            let scope = Scope::row(table, row, params);
            if filter(selection, &scope)? {
                let mut new = row.clone();
                for (idx, value) in &targets {
                    new[*idx] = eval(value, &scope)?;
                }
                updates.push((pos, new));
            }
        }

        let before = table.rows.clone();
        for (pos, new) in &updates {
            table.rows[*pos] = new.clone();
        }
        if table.has_duplicate_key() {
            table.rows = before;
            return Err(duplicate_key(&key.1));
        }

        let affected = updates.len() as u64;
        for (pos, new) in updates {
            changes.push(Change::UpdateRow {
                key: key.clone(),
                old: before[pos].clone(),
                new,
            });
        }

        Ok(QueryResult::empty().with_rows_affected(affected))
    }

    fn delete(
        &mut self,
        delete: &sql_ast::Delete,
        params: &[&str],
        changes: &mut Vec<Change>,
    ) -> Result<QueryResult> {
        let tables = match &delete.from {
            sql_ast::FromTable::WithFromKeyword(tables) | sql_ast::FromTable::WithoutKeyword(tables) => tables,
        };
        let [target] = tables.as_slice() else {
            return Err(unsupported("DELETE from several tables"));
        };
        let key = table_key(&target.relation)?;
        let table = self
            .tables
            .get_mut(&key)
            .ok_or_else(|| missing_relation(&key.1))?;

        let mut removed = Vec::new();
        for (pos, row) in table.rows.iter().enumerate() {
            if filter(delete.selection.as_ref(), &Scope::row(table, row, params))? {
                removed.push(pos);
            }
        }

        let affected = removed.len() as u64;
        for pos in removed.into_iter().rev() {
            let row = table.rows.remove(pos);
            changes.push(Change::DeleteRow {
                key: key.clone(),
                row,
            });
        }

        Ok(QueryResult::empty().with_rows_affected(affected))
    }

    fn query(&self, query: &sql_ast::Query, params: &[&str]) -> Result<QueryResult> {
        let sql_ast::SetExpr::Select(select) = query.body.as_ref() else {
            return Err(unsupported("set operations"));
        };
        if select.distinct.is_some() || select.having.is_some() {
            return Err(unsupported("DISTINCT and HAVING"));
        }
        match &select.group_by {
            sql_ast::GroupByExpr::Expressions(exprs, _) if exprs.is_empty() => {}
            _ => return Err(unsupported("GROUP BY")),
        }

        let table = match select.from.as_slice() {
            [] => Cow::Owned(Table {
                columns: Vec::new(),
                primary_key: None,
                rows: vec![Vec::new()],
            }),
            [from] if from.joins.is_empty() => self.readable(&table_key(&from.relation)?)?,
            _ => return Err(unsupported("joins")),
        };

        let mut rows = Vec::new();
        for row in &table.rows {
            if filter(select.selection.as_ref(), &Scope::row(&table, row, params))? {
                rows.push(row);
            }
        }

        let order = order_by(query)?;
        if !order.is_empty() {
            let mut keyed = Vec::with_capacity(rows.len());
            for row in rows {
                let scope = Scope::row(&table, row, params);
                let keys = order
                    .iter()
                    .map(|(expr, _)| eval(expr, &scope))
                    .collect::<Result<Vec<_>>>()?;
                keyed.push((keys, row));
            }
            keyed.sort_by(|(a, _), (b, _)| {
                a.iter()
                    .zip(b)
                    .zip(&order)
                    .map(|((a, b), (_, descending))| {
                        let ordering = a.compare(b);
                        if *descending { ordering.reverse() } else { ordering }
                    })
                    .find(|ordering| *ordering != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
            rows = keyed.into_iter().map(|(_, row)| row).collect();
        }

        let (offset, limit) = limits(query, params)?;
        let rows = rows.into_iter().skip(offset).take(limit.unwrap_or(usize::MAX));

        let mut columns = Vec::new();
        let mut outputs = Vec::new();
        for item in &select.projection {
            match item {
                sql_ast::SelectItem::Wildcard(_) => {
                    for (idx, column) in table.columns.iter().enumerate() {
                        columns.push(column.clone());
                        outputs.push(Output::Column(idx));
                    }
                }
                sql_ast::SelectItem::UnnamedExpr(expr) => {
                    columns.push(output_name(expr));
                    outputs.push(Output::Expr(expr));
                }
                sql_ast::SelectItem::ExprWithAlias { expr, alias } => {
                    columns.push(ident_name(alias));
                    outputs.push(Output::Expr(expr));
                }
                _ => return Err(unsupported("qualified wildcards")),
            }
        }

        let rows = rows
            .map(|row| {
                let scope = Scope::row(&table, row, params);
                outputs
                    .iter()
                    .map(|output| match output {
                        Output::Column(idx) => Ok(row[*idx].clone()),
                        Output::Expr(expr) => eval(expr, &scope),
                    })
                    .collect::<Result<Row>>()
            })
            .collect::<Result<Vec<_>>>()?;
        let count = rows.len() as u64;

        Ok(QueryResult::new(columns, rows).with_rows_affected(count))
    }

    /// Resolves a table for reading, including the `information_schema` views.
    fn readable(&self, key: &TableKey) -> Result<Cow<'_, Table>> {
        match (key.0.as_str(), key.1.as_str()) {
            ("information_schema", "schemata") => Ok(Cow::Owned(Table {
                columns: vec!["schema_name".to_string()],
                primary_key: None,
                rows: self
                    .schemas
                    .iter()
                    .map(|s| vec![Value::from(s.as_str())])
                    .collect(),
            })),
            ("information_schema", "tables") => Ok(Cow::Owned(Table {
                columns: vec!["table_schema".to_string(), "table_name".to_string()],
                primary_key: None,
                rows: self
                    .tables
                    .keys()
                    .map(|(schema, table)| vec![Value::from(schema.as_str()), Value::from(table.as_str())])
                    .collect(),
            })),
            _ => self
                .tables
                .get(key)
                .map(Cow::Borrowed)
                .ok_or_else(|| missing_relation(&key.1)),
        }
    }
}

enum Output<'a> {
    Column(usize),
    Expr(&'a sql_ast::Expr),
}

/// What column references resolve against while evaluating an expression.
struct Scope<'a> {
    table: Option<&'a Table>,
    row: Option<&'a Row>,
    /// The proposed row inside `ON CONFLICT ... DO UPDATE`.
    excluded: Option<&'a Row>,
    params: &'a [&'a str],
}

impl<'a> Scope<'a> {
    fn constant(params: &'a [&'a str]) -> Self {
        Self {
            table: None,
            row: None,
            excluded: None,
            params,
        }
    }

    fn row(table: &'a Table, row: &'a Row, params: &'a [&'a str]) -> Self {
        Self {
            table: Some(table),
            row: Some(row),
            excluded: None,
            params,
        }
    }

    fn column(&self, name: &str, excluded: bool) -> Result<Value> {
        let row = if excluded { self.excluded } else { self.row };
        match (self.table, row) {
            (Some(table), Some(row)) => Ok(row[table.column(name)?].clone()),
            _ => Err(DbError::database(
                "42703",
                format!("column \"{}\" does not exist", name),
            )),
        }
    }
}

fn eval(expr: &sql_ast::Expr, scope: &Scope<'_>) -> Result<Value> {
    match expr {
        sql_ast::Expr::Identifier(ident) => scope.column(&ident_name(ident), false),
        sql_ast::Expr::CompoundIdentifier(parts) => match parts.as_slice() {
            [qualifier, column] if ident_name(qualifier) == "excluded" && scope.excluded.is_some() => {
                scope.column(&ident_name(column), true)
            }
            [.., column] => scope.column(&ident_name(column), false),
            [] => Err(syntax_error("empty identifier")),
        },
        sql_ast::Expr::Value(value) => literal(&value.value, scope.params),
        sql_ast::Expr::Cast { expr, .. } | sql_ast::Expr::Nested(expr) => eval(expr, scope),
        sql_ast::Expr::IsNull(inner) => Ok(Value::Boolean(eval(inner, scope)?.is_null())),
        sql_ast::Expr::IsNotNull(inner) => Ok(Value::Boolean(!eval(inner, scope)?.is_null())),
        sql_ast::Expr::UnaryOp { op, expr } => {
            let value = eval(expr, scope)?;
            match (op, value) {
                (_, Value::Null) => Ok(Value::Null),
                (sql_ast::UnaryOperator::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
                (sql_ast::UnaryOperator::Minus, Value::Integer(i)) => checked(i.checked_neg()),
                (sql_ast::UnaryOperator::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
                (op, value) => Err(type_error(format!("{}{}", op, value.type_name()))),
            }
        }
        sql_ast::Expr::BinaryOp { left, op, right } => {
            binary(eval(left, scope)?, op, eval(right, scope)?)
        }
        other => Err(unsupported(format!("expression {}", other))),
    }
}

fn binary(left: Value, op: &sql_ast::BinaryOperator, right: Value) -> Result<Value> {
    use sql_ast::BinaryOperator as Op;

    match op {
        Op::And => return Ok(Value::Boolean(truthy(&left) && truthy(&right))),
        Op::Or => return Ok(Value::Boolean(truthy(&left) || truthy(&right))),
        _ => {}
    }
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    let ordering = || match (&left, &right) {
        (Value::Text(_), Value::Text(_))
        | (Value::Boolean(_), Value::Boolean(_))
        | (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            left.compare(&right)
        }
        _ => left.to_string().cmp(&right.to_string()),
    };

    let value = match (op, &left, &right) {
        (Op::Eq, _, _) => Value::Boolean(values_equal(&left, &right)),
        (Op::NotEq, _, _) => Value::Boolean(!values_equal(&left, &right)),
        (Op::Lt, _, _) => Value::Boolean(ordering() == Ordering::Less),
        (Op::LtEq, _, _) => Value::Boolean(ordering() != Ordering::Greater),
        (Op::Gt, _, _) => Value::Boolean(ordering() == Ordering::Greater),
        (Op::GtEq, _, _) => Value::Boolean(ordering() != Ordering::Less),
        (Op::Plus, Value::Integer(a), Value::Integer(b)) => checked(a.checked_add(*b))?,
        (Op::Minus, Value::Integer(a), Value::Integer(b)) => checked(a.checked_sub(*b))?,
        (Op::Multiply, Value::Integer(a), Value::Integer(b)) => checked(a.checked_mul(*b))?,
        (Op::StringConcat, _, _) => Value::Text(format!("{}{}", left, right)),
        _ => {
            return Err(type_error(format!(
                "{} {} {}",
                left.type_name(),
                op,
                right.type_name()
            )));
        }
    };
    Ok(value)
}

fn checked(result: Option<i64>) -> Result<Value> {
    result
        .map(Value::Integer)
        .ok_or_else(|| DbError::database("22003", "integer out of range"))
}

fn filter(selection: Option<&sql_ast::Expr>, scope: &Scope<'_>) -> Result<bool> {
    match selection {
        Some(expr) => Ok(truthy(&eval(expr, scope)?)),
        None => Ok(true),
    }
}

fn truthy(value: &Value) -> bool {
    matches!(value, Value::Boolean(true))
}

fn order_by(query: &sql_ast::Query) -> Result<Vec<(&sql_ast::Expr, bool)>> {
    let Some(order_by) = &query.order_by else {
        return Ok(Vec::new());
    };
    match &order_by.kind {
        sql_ast::OrderByKind::Expressions(exprs) => Ok(exprs
            .iter()
            .map(|order| (&order.expr, order.options.asc == Some(false)))
            .collect()),
        sql_ast::OrderByKind::All(_) => Err(unsupported("ORDER BY ALL")),
    }
}

fn limits(query: &sql_ast::Query, params: &[&str]) -> Result<(usize, Option<usize>)> {
    let count = |expr: &sql_ast::Expr| -> Result<usize> {
        eval(expr, &Scope::constant(params))?
            .as_i64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| DbError::database("2201W", "LIMIT and OFFSET must be non-negative integers"))
    };

    match &query.limit_clause {
        None => Ok((0, None)),
        Some(sql_ast::LimitClause::LimitOffset { limit, offset, .. }) => {
            let offset = offset.as_ref().map(|o| count(&o.value)).transpose()?;
            let limit = limit.as_ref().map(count).transpose()?;
            Ok((offset.unwrap_or(0), limit))
        }
        Some(sql_ast::LimitClause::OffsetCommaLimit { offset, limit }) => {
            Ok((count(offset)?, Some(count(limit)?)))
        }
    }
}

fn output_name(expr: &sql_ast::Expr) -> String {
    match expr {
        sql_ast::Expr::Identifier(ident) => ident_name(ident),
        sql_ast::Expr::CompoundIdentifier(parts) => {
            parts.last().map(ident_name).unwrap_or_default()
        }
        sql_ast::Expr::Function(func) => function_name(func),
        sql_ast::Expr::Nested(inner) => output_name(inner),
        _ => "?column?".to_string(),
    }
}

fn table_key(factor: &sql_ast::TableFactor) -> Result<TableKey> {
    match factor {
        sql_ast::TableFactor::Table { name, .. } => Ok(relation(name)),
        _ => Err(unsupported("derived tables")),
    }
}

fn assignment_column(target: &sql_ast::AssignmentTarget) -> Result<String> {
    match target {
        sql_ast::AssignmentTarget::ColumnName(name) => name_parts(&name.to_string())
            .pop()
            .ok_or_else(|| syntax_error("empty column name")),
        _ => Err(unsupported("tuple assignment")),
    }
}

/// `PRIMARY KEY (a, ...)` of a rendered table constraint, first column only.
fn primary_key_column_of(constraint: &str) -> Option<String> {
    let (_, rest) = constraint.split_once("PRIMARY KEY")?;
    let (_, columns) = rest.split_once('(')?;
    let first = columns.split([',', ')']).next()?.split_whitespace().next()?;
    name_parts(first).pop()
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    a == b || a.to_string() == b.to_string()
}

fn missing_relation(name: &str) -> DbError {
    DbError::database("42P01", format!("relation \"{}\" does not exist", name))
}

fn duplicate_key(table: &str) -> DbError {
    DbError::database(
        "23505",
        format!("duplicate key value violates unique constraint \"{}_pkey\"", table),
    )
}

fn type_error(operation: String) -> DbError {
    DbError::database("42883", format!("operator does not exist: {}", operation))
}

fn serialization_failure() -> DbError {
    DbError::database("40001", "could not serialize access due to concurrent update")
}
