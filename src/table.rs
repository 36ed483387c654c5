use std::collections::HashMap;

use anyhow::{Result, anyhow};
use serde_json::Value;
use tracing::{error, warn};

pub const PLAYER_ID: &str = "PLAYER_ID";
pub const SEASON_YEAR: &str = "SEASON_YEAR";
pub const KEY_COLUMNS: [&str; 2] = [PLAYER_ID, SEASON_YEAR];

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Num(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Num(f64),
    Text(String),
    Null,
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Num(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Num(_))
    }

    pub fn null_count(&self) -> usize {
        match self {
            Column::Num(v) => v.iter().filter(|x| x.is_none()).count(),
            Column::Text(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    pub fn cell(&self, row: usize) -> Cell {
        match self {
            Column::Num(v) => v.get(row).copied().flatten().map_or(Cell::Null, Cell::Num),
            Column::Text(v) => v
                .get(row)
                .cloned()
                .flatten()
                .map_or(Cell::Null, Cell::Text),
        }
    }

    /// Gathers rows by index; `None` produces a null.
    fn gather(&self, rows: &[Option<usize>]) -> Column {
        match self {
            Column::Num(v) => Column::Num(rows.iter().map(|r| r.and_then(|i| v[i])).collect()),
            Column::Text(v) => {
                Column::Text(rows.iter().map(|r| r.and_then(|i| v[i].clone())).collect())
            }
        }
    }

    fn into_text(self) -> Vec<Option<String>> {
        match self {
            Column::Text(v) => v,
            Column::Num(v) => v.into_iter().map(|x| x.map(|n| n.to_string())).collect(),
        }
    }
}

/// Column-oriented table with nullable numeric and text columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    rows: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_rows(&self) -> usize {
        self.rows
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter())
    }

    pub fn num(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.column(name)? {
            Column::Num(v) => Some(v.as_slice()),
            Column::Text(_) => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&[Option<String>]> {
        match self.column(name)? {
            Column::Text(v) => Some(v.as_slice()),
            Column::Num(_) => None,
        }
    }

    pub fn f64_at(&self, name: &str, row: usize) -> Option<f64> {
        self.num(name)?.get(row).copied().flatten()
    }

    pub fn str_at(&self, name: &str, row: usize) -> Option<&str> {
        self.text(name)?.get(row)?.as_deref()
    }

    /// Adds a column, replacing any column of the same name in place.
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if !self.names.is_empty() && column.len() != self.rows {
            return Err(anyhow!(
                "column {name} has {} rows, table has {}",
                column.len(),
                self.rows
            ));
        }
        if self.names.is_empty() {
            self.rows = column.len();
        }
        if let Some(&i) = self.index.get(&name) {
            self.columns[i] = column;
        } else {
            self.index.insert(name.clone(), self.names.len());
            self.names.push(name);
            self.columns.push(column);
        }
        Ok(())
    }

    pub fn set_num(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<()> {
        self.push_column(name, Column::Num(values))
    }

    pub fn fill_text(&mut self, name: &str, value: &str) -> Result<()> {
        let values = vec![Some(value.to_string()); self.rows];
        self.push_column(name, Column::Text(values))
    }

    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        if from == to || self.has(to) {
            return false;
        }
        let Some(i) = self.index.remove(from) else {
            return false;
        };
        self.names[i] = to.to_string();
        self.index.insert(to.to_string(), i);
        true
    }

    /// Renames every column `f` maps to `Some(new_name)`.
    pub fn rename_with(&mut self, f: impl Fn(&str) -> Option<String>) {
        let renames = self
            .names
            .iter()
            .filter_map(|n| f(n).map(|to| (n.clone(), to)))
            .collect::<Vec<_>>();
        for (from, to) in renames {
            if !self.rename(&from, &to) {
                warn!("rename {from} -> {to} skipped: target already present");
            }
        }
    }

    pub fn drop_columns(&mut self, drop: &[&str]) {
        let mut names = Vec::with_capacity(self.names.len());
        let mut columns = Vec::with_capacity(self.columns.len());
        for (name, col) in self.names.drain(..).zip(self.columns.drain(..)) {
            if !drop.contains(&name.as_str()) {
                names.push(name);
                columns.push(col);
            }
        }
        self.names = names;
        self.columns = columns;
        self.reindex();
    }

    /// Projects onto the named columns that exist, in the order given.
    pub fn select(&self, wanted: &[&str]) -> Table {
        let mut out = Table::new();
        out.rows = self.rows;
        for name in wanted {
            if let Some(col) = self.column(name)
                && !out.has(name)
            {
                out.index.insert(name.to_string(), out.names.len());
                out.names.push(name.to_string());
                out.columns.push(col.clone());
            }
        }
        out
    }

    pub fn take_rows(&self, rows: &[usize]) -> Table {
        let gather = rows.iter().map(|&r| Some(r)).collect::<Vec<_>>();
        Table {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.gather(&gather)).collect(),
            index: self.index.clone(),
            rows: rows.len(),
        }
    }

    pub fn filter_rows(&self, keep: impl Fn(usize) -> bool) -> Table {
        let rows = (0..self.rows).filter(|&r| keep(r)).collect::<Vec<_>>();
        self.take_rows(&rows)
    }

    /// `(PLAYER_ID, SEASON_YEAR)` of a row; ids stored as numbers or numeric strings both resolve.
    pub fn key_at(&self, row: usize) -> Option<(i64, String)> {
        let id = match self.column(PLAYER_ID)? {
            Column::Num(v) => v.get(row).copied().flatten().map(|x| x as i64),
            Column::Text(v) => v.get(row)?.as_deref().and_then(|s| s.trim().parse().ok()),
        }?;
        let season = self.str_at(SEASON_YEAR, row)?.to_string();
        Some((id, season))
    }

    /// First duplicated `(PLAYER_ID, SEASON_YEAR)` key, if any.
    pub fn first_duplicate_key(&self) -> Option<(i64, String)> {
        let mut seen = HashMap::new();
        for r in 0..self.rows {
            let Some(key) = self.key_at(r) else {
                continue;
            };
            if seen.insert(key.clone(), r).is_some() {
                return Some(key);
            }
        }
        None
    }

    pub fn duplicate_key_count(&self) -> usize {
        let mut seen = std::collections::HashSet::new();
        (0..self.rows)
            .filter_map(|r| self.key_at(r))
            .filter(|key| !seen.insert(key.clone()))
            .count()
    }

    fn join_key(&self, row: usize, keys: &[&str]) -> Option<String> {
        let mut parts = Vec::with_capacity(keys.len());
        for key in keys {
            match self.column(key)?.cell(row) {
                Cell::Num(x) => parts.push(format!("{}", x as i64)),
                Cell::Text(s) => parts.push(s),
                Cell::Null => return None,
            }
        }
        Some(parts.join("\u{1f}"))
    }

    /// Left join on `keys`. Right-hand duplicate keys resolve to their first row.
    /// Non-key columns already present on the left are skipped.
    pub fn left_join(&self, right: &Table, keys: &[&str], label: &str) -> Result<Table> {
        for key in keys {
            if !self.has(key) || !right.has(key) {
                return Err(anyhow!("join {label}: key column {key} missing"));
            }
        }
        let mut right_index: HashMap<String, usize> = HashMap::new();
        let mut dup = 0usize;
        for r in 0..right.rows {
            let Some(k) = right.join_key(r, keys) else {
                continue;
            };
            if right_index.contains_key(&k) {
                dup += 1;
            } else {
                right_index.insert(k, r);
            }
        }
        if dup > 0 {
            warn!("join {label}: {dup} duplicate right-hand keys, keeping first occurrence");
        }

        let mapping = (0..self.rows)
            .map(|r| self.join_key(r, keys).and_then(|k| right_index.get(&k).copied()))
            .collect::<Vec<_>>();

        let mut out = self.clone();
        for (name, col) in right.columns() {
            if keys.contains(&name) || out.has(name) {
                continue;
            }
            out.push_column(name, col.gather(&mapping))?;
        }
        Ok(out)
    }

    /// Stacks tables by column name; columns missing from a table are null for its rows.
    /// A column that is text anywhere becomes text everywhere.
    pub fn concat_diagonal(tables: Vec<Table>) -> Result<Table> {
        let mut order: Vec<String> = Vec::new();
        let mut textual: HashMap<String, bool> = HashMap::new();
        for t in &tables {
            for (name, col) in t.columns() {
                let entry = textual.entry(name.to_string()).or_insert_with(|| {
                    order.push(name.to_string());
                    false
                });
                *entry |= !col.is_numeric();
            }
        }
        let total = tables.iter().map(|t| t.rows).sum::<usize>();
        let mut out = Table::new();
        for name in &order {
            let as_text = textual.get(name).copied().unwrap_or(false);
            let col = if as_text {
                let mut values = Vec::with_capacity(total);
                for t in &tables {
                    match t.column(name) {
                        Some(c) => values.extend(c.clone().into_text()),
                        None => values.extend(std::iter::repeat_n(None, t.rows)),
                    }
                }
                Column::Text(values)
            } else {
                let mut values = Vec::with_capacity(total);
                for t in &tables {
                    match t.num(name) {
                        Some(v) => values.extend_from_slice(v),
                        None => values.extend(std::iter::repeat_n(None, t.rows)),
                    }
                }
                Column::Num(values)
            };
            out.push_column(name.clone(), col)?;
        }
        out.rows = total;
        Ok(out)
    }

    /// Extracts the named result set from a stats payload.
    /// A column is text when every non-null value is a string.
    pub fn from_result_set(payload: &Value, name: &str) -> Option<Table> {
        let Some(set) = find_result_set(payload, name) else {
            error!("could not find result set '{name}'");
            return None;
        };
        let headers = set.get("headers")?.as_array()?;
        let rows = set.get("rowSet")?.as_array()?;
        let mut table = Table::new();
        table.rows = rows.len();
        for (ci, header) in headers.iter().enumerate() {
            let Some(header) = header.as_str() else {
                continue;
            };
            let cells = rows
                .iter()
                .map(|row| row.get(ci).unwrap_or(&Value::Null))
                .collect::<Vec<_>>();
            let all_text = cells.iter().all(|c| c.is_null() || c.is_string());
            let any_text = cells.iter().any(|c| c.is_string());
            let col = if all_text && any_text {
                Column::Text(cells.iter().map(|c| c.as_str().map(str::to_string)).collect())
            } else {
                Column::Num(cells.iter().map(|c| value_as_f64(c)).collect())
            };
            if table.push_column(header, col).is_err() {
                return None;
            }
        }
        Some(table)
    }

    fn reindex(&mut self) {
        self.index = self
            .names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
    }
}

fn find_result_set<'a>(payload: &'a Value, name: &str) -> Option<&'a Value> {
    let matches = |set: &&Value| set.get("name").and_then(Value::as_str) == Some(name);
    match payload.get("resultSets") {
        Some(Value::Array(sets)) => sets.iter().find(matches),
        Some(set @ Value::Object(_)) => Some(set).filter(matches),
        _ => payload.get("resultSet").filter(matches),
    }
}

fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
