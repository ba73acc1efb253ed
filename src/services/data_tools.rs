//! 表格数据工具 - 业务能力层
//!
//! 解析下载的 CSV / JSON 文件，并提供过滤、聚合、统计分析等操作。
//! 单元格统一用 JSON 值表示。

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{json, Map, Value as JsonValue};
use thiserror::Error;

use crate::error::QuizError;

/// 表格操作错误
#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("列不存在: {0}")]
    UnknownColumn(String),

    #[error("列 {0} 没有数值数据")]
    NotNumeric(String),

    #[error("第 {line} 行格式错误: {message}")]
    Malformed { line: usize, message: String },

    #[error("文件不是 UTF-8 文本")]
    NotUtf8,

    #[error("表格为空")]
    Empty,

    #[error("不支持的操作: {0}")]
    Unsupported(String),

    #[error("PDF 解析失败: {0}")]
    Pdf(String),

    #[error("页码 {page} 超出范围，共 {total} 页")]
    PageOutOfRange { page: u32, total: usize },

    #[error("没有找到表格")]
    NoTable,

    #[error("图表渲染失败: {0}")]
    Chart(String),
}

impl From<TableError> for QuizError {
    fn from(err: TableError) -> Self {
        QuizError::data_processing(err.to_string()).with_source(err)
    }
}

pub type TableResult<T> = std::result::Result<T, TableError>;

/// 二维表格
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

// ========== 解析 ==========

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Self {
        Self { columns, rows }
    }

    /// 解析 CSV，首行为表头
    ///
    /// 行长不一时，短行补空，长行报错。
    pub fn from_csv(bytes: &[u8]) -> TableResult<Self> {
        let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let columns: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|c| c.trim().to_string())
            .collect();
        if columns.is_empty() {
            return Err(TableError::Empty);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            if record.len() == 1 && record[0].trim().is_empty() {
                continue;
            }
            if record.len() > columns.len() {
                return Err(TableError::Malformed {
                    line: record.position().map(|p| p.line() as usize).unwrap_or(0),
                    message: format!("期望 {} 列，实际 {} 列", columns.len(), record.len()),
                });
            }
            let mut row: Vec<JsonValue> = record.iter().map(infer_cell).collect();
            row.resize(columns.len(), JsonValue::Null);
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    /// JSON 转表格：对象数组，或每个值都是等长数组的对象
    ///
    /// 其它形状返回 `None`，由调用方按结构化结果保存。
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Array(items) if !items.is_empty() && items.iter().all(JsonValue::is_object) => {
                let mut columns: Vec<String> = Vec::new();
                for item in items {
                    if let JsonValue::Object(map) = item {
                        for key in map.keys() {
                            if !columns.contains(key) {
                                columns.push(key.clone());
                            }
                        }
                    }
                }
                let rows = items
                    .iter()
                    .map(|item| {
                        columns
                            .iter()
                            .map(|c| item.get(c).cloned().unwrap_or(JsonValue::Null))
                            .collect()
                    })
                    .collect();
                Some(Self { columns, rows })
            }
            JsonValue::Object(map) if !map.is_empty() => {
                let arrays: Vec<&Vec<JsonValue>> = map.values().filter_map(JsonValue::as_array).collect();
                if arrays.len() != map.len() {
                    return None;
                }
                let height = arrays.first().map(|a| a.len())?;
                if arrays.iter().any(|a| a.len() != height) {
                    return None;
                }
                let columns = map.keys().cloned().collect();
                let rows = (0..height)
                    .map(|i| arrays.iter().map(|a| a[i].clone()).collect())
                    .collect();
                Some(Self { columns, rows })
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> TableResult<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))
    }

    /// 某一列的全部单元格
    pub fn column(&self, name: &str) -> TableResult<Vec<JsonValue>> {
        let index = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[index].clone()).collect())
    }

    /// 某一列中可以转成数值的单元格
    pub fn numeric_column(&self, name: &str) -> TableResult<Vec<f64>> {
        let index = self.column_index(name)?;
        Ok(self.rows.iter().filter_map(|row| as_f64(&row[index])).collect())
    }

    /// 至少含有一个数值且没有非空的非数值单元格的列
    pub fn numeric_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let mut any = false;
                for row in &self.rows {
                    match &row[*i] {
                        JsonValue::Null => {}
                        cell if as_f64(cell).is_some() => any = true,
                        _ => return false,
                    }
                }
                any
            })
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// 每行转成一个 JSON 对象
    pub fn to_records(&self) -> Vec<JsonValue> {
        self.rows
            .iter()
            .map(|row| {
                let map: Map<String, JsonValue> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                JsonValue::Object(map)
            })
            .collect()
    }

    pub fn head(&self, n: usize) -> Vec<JsonValue> {
        let mut records = self.to_records();
        records.truncate(n);
        records
    }

    /// 给推理服务看的简要信息
    pub fn preview(&self) -> JsonValue {
        json!({
            "shape": [self.len(), self.columns.len()],
            "columns": self.columns,
            "head": self.head(3),
        })
    }
}

fn csv_error(err: csv::Error) -> TableError {
    match err.kind() {
        csv::ErrorKind::Utf8 { .. } => TableError::NotUtf8,
        _ => TableError::Malformed {
            line: err.position().map(|p| p.line() as usize).unwrap_or(0),
            message: err.to_string(),
        },
    }
}

/// 单元格类型推断
pub(crate) fn infer_cell(raw: &str) -> JsonValue {
    let cell = raw.trim();
    if cell.is_empty() {
        return JsonValue::Null;
    }
    if let Ok(int) = cell.parse::<i64>() {
        return JsonValue::from(int);
    }
    if let Ok(float) = cell.parse::<f64>() {
        if float.is_finite() {
            return JsonValue::from(float);
        }
    }
    match cell.to_ascii_lowercase().as_str() {
        "true" => JsonValue::Bool(true),
        "false" => JsonValue::Bool(false),
        _ => JsonValue::String(cell.to_string()),
    }
}

/// 单元格转数值
pub fn as_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// 整数值输出为整数，其它输出为浮点
pub fn number_json(value: f64) -> JsonValue {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        JsonValue::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

fn compare_cells(a: &JsonValue, b: &JsonValue) -> Ordering {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => match (a, b) {
            (JsonValue::Null, JsonValue::Null) => Ordering::Equal,
            (JsonValue::Null, _) => Ordering::Greater,
            (_, JsonValue::Null) => Ordering::Less,
            _ => cell_text(a).cmp(&cell_text(b)),
        },
    }
}

fn cells_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => cell_text(a) == cell_text(b),
    }
}

/// 单元格的文本形式（字符串不带引号）
pub fn cell_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

// ========== 过滤 ==========

/// 过滤运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    In,
    NotIn,
    Contains,
}

impl FilterOp {
    pub fn parse(op: &str) -> TableResult<Self> {
        Ok(match op {
            "==" => FilterOp::Eq,
            "!=" => FilterOp::Ne,
            ">" => FilterOp::Gt,
            "<" => FilterOp::Lt,
            ">=" => FilterOp::Ge,
            "<=" => FilterOp::Le,
            "in" => FilterOp::In,
            "not_in" => FilterOp::NotIn,
            "contains" => FilterOp::Contains,
            other => return Err(TableError::Unsupported(format!("过滤运算符 {}", other))),
        })
    }
}

/// 过滤条件
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: FilterOp,
    pub value: JsonValue,
}

impl Condition {
    fn matches(&self, cell: &JsonValue) -> bool {
        let ordered =
            |want: &[Ordering]| !cell.is_null() && want.contains(&compare_cells(cell, &self.value));
        match self.op {
            FilterOp::Eq => cells_equal(cell, &self.value),
            FilterOp::Ne => !cells_equal(cell, &self.value),
            FilterOp::Gt => ordered(&[Ordering::Greater]),
            FilterOp::Lt => ordered(&[Ordering::Less]),
            FilterOp::Ge => ordered(&[Ordering::Greater, Ordering::Equal]),
            FilterOp::Le => ordered(&[Ordering::Less, Ordering::Equal]),
            FilterOp::In | FilterOp::NotIn => {
                let found = self
                    .value
                    .as_array()
                    .map(|items| items.iter().any(|v| cells_equal(cell, v)))
                    .unwrap_or_else(|| cells_equal(cell, &self.value));
                (self.op == FilterOp::In) == found
            }
            FilterOp::Contains => cell_text(cell).contains(&cell_text(&self.value)),
        }
    }
}

impl Table {
    /// 按全部条件（与）过滤
    pub fn filter(&self, conditions: &[Condition]) -> TableResult<Table> {
        let indexed = conditions
            .iter()
            .map(|c| Ok((self.column_index(&c.column)?, c)))
            .collect::<TableResult<Vec<_>>>()?;

        let rows = self
            .rows
            .iter()
            .filter(|row| indexed.iter().all(|(i, c)| c.matches(&row[*i])))
            .cloned()
            .collect();

        Ok(Table {
            columns: self.columns.clone(),
            rows,
        })
    }
}

// ========== 聚合 ==========

/// 聚合函数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Mean,
    Count,
    Min,
    Max,
    Median,
}

impl AggFunc {
    pub fn parse(name: &str) -> TableResult<Self> {
        Ok(match name {
            "sum" => AggFunc::Sum,
            "mean" | "avg" | "average" => AggFunc::Mean,
            "count" => AggFunc::Count,
            "min" => AggFunc::Min,
            "max" => AggFunc::Max,
            "median" => AggFunc::Median,
            other => return Err(TableError::Unsupported(format!("聚合函数 {}", other))),
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Count => "count",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Median => "median",
        }
    }

    fn apply(&self, cells: &[&JsonValue]) -> JsonValue {
        let mut values: Vec<f64> = cells.iter().filter_map(|c| as_f64(c)).collect();
        match self {
            AggFunc::Count => JsonValue::from(cells.iter().filter(|c| !c.is_null()).count()),
            AggFunc::Sum => number_json(values.iter().sum()),
            _ if values.is_empty() => JsonValue::Null,
            AggFunc::Mean => number_json(mean(&values)),
            AggFunc::Min => number_json(values.iter().copied().fold(f64::INFINITY, f64::min)),
            AggFunc::Max => number_json(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
            AggFunc::Median => number_json(median(&mut values)),
        }
    }
}

/// 聚合结果
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregated {
    /// 不分组时的 `{列: 值}`
    Scalar(JsonValue),
    /// 分组时每组一行
    Grouped(Table),
}

impl Table {
    /// 聚合
    ///
    /// # 参数
    /// - `operations`: (列, 聚合函数) 列表
    /// - `group_by`: 可选的分组列
    pub fn aggregate(&self, operations: &[(String, AggFunc)], group_by: Option<&str>) -> TableResult<Aggregated> {
        let indexed = operations
            .iter()
            .map(|(column, func)| Ok((self.column_index(column)?, column, *func)))
            .collect::<TableResult<Vec<_>>>()?;

        let Some(group_column) = group_by else {
            let mut result = Map::new();
            for (index, column, func) in &indexed {
                let cells: Vec<&JsonValue> = self.rows.iter().map(|row| &row[*index]).collect();
                result.insert((*column).clone(), func.apply(&cells));
            }
            return Ok(Aggregated::Scalar(JsonValue::Object(result)));
        };

        let group_index = self.column_index(group_column)?;
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, (JsonValue, Vec<&Vec<JsonValue>>)> = HashMap::new();
        for row in &self.rows {
            let key = cell_text(&row[group_index]);
            groups
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    (row[group_index].clone(), Vec::new())
                })
                .1
                .push(row);
        }

        let mut columns = vec![group_column.to_string()];
        columns.extend(indexed.iter().map(|(_, column, _)| (*column).clone()));

        let rows = order
            .iter()
            .filter_map(|key| groups.get(key))
            .map(|(label, members)| {
                let mut row = vec![label.clone()];
                for (index, _, func) in &indexed {
                    let cells: Vec<&JsonValue> = members.iter().map(|r| &r[*index]).collect();
                    row.push(func.apply(&cells));
                }
                row
            })
            .collect();

        Ok(Aggregated::Grouped(Table { columns, rows }))
    }
}

// ========== 分析 ==========

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// 样本标准差
fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let (mx, my) = (mean(xs), mean(ys));
    let cov: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let vx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    let vy: f64 = ys.iter().map(|y| (y - my).powi(2)).sum();
    let denominator = (vx * vy).sqrt();
    (denominator > 0.0).then(|| cov / denominator)
}

impl Table {
    /// 数值列的描述统计
    pub fn statistics(&self, columns: Option<&[String]>) -> TableResult<JsonValue> {
        let targets = match columns {
            Some(cols) if !cols.is_empty() => cols.to_vec(),
            _ => self.numeric_columns(),
        };
        if targets.is_empty() {
            return Err(TableError::NotNumeric("*".to_string()));
        }

        let mut result = Map::new();
        for column in targets {
            let mut values = self.numeric_column(&column)?;
            if values.is_empty() {
                return Err(TableError::NotNumeric(column));
            }
            let stats = json!({
                "count": values.len(),
                "sum": number_json(values.iter().sum()),
                "mean": number_json(mean(&values)),
                "std": std_dev(&values).map(number_json).unwrap_or(JsonValue::Null),
                "min": number_json(values.iter().copied().fold(f64::INFINITY, f64::min)),
                "max": number_json(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
                "median": number_json(median(&mut values)),
            });
            result.insert(column, stats);
        }
        Ok(JsonValue::Object(result))
    }

    /// 皮尔逊相关系数矩阵
    pub fn correlation(&self, columns: Option<&[String]>) -> TableResult<Table> {
        let targets = match columns {
            Some(cols) if cols.len() >= 2 => cols.to_vec(),
            _ => self.numeric_columns(),
        };
        if targets.len() < 2 {
            return Err(TableError::Unsupported("相关分析至少需要两列数值".to_string()));
        }
        let indices = targets
            .iter()
            .map(|c| self.column_index(c))
            .collect::<TableResult<Vec<_>>>()?;

        let mut out_columns = vec!["column".to_string()];
        out_columns.extend(targets.iter().cloned());

        let rows = indices
            .iter()
            .zip(&targets)
            .map(|(&a, name)| {
                let mut row = vec![JsonValue::String(name.clone())];
                for &b in &indices {
                    let (xs, ys): (Vec<f64>, Vec<f64>) = self
                        .rows
                        .iter()
                        .filter_map(|r| Some((as_f64(&r[a])?, as_f64(&r[b])?)))
                        .unzip();
                    row.push(pearson(&xs, &ys).map(number_json).unwrap_or(JsonValue::Null));
                }
                row
            })
            .collect();

        Ok(Table::new(out_columns, rows))
    }

    /// 频数统计，按次数降序
    pub fn value_counts(&self, column: &str, normalize: bool, top_n: Option<usize>) -> TableResult<Table> {
        let index = self.column_index(column)?;
        let mut order: Vec<(JsonValue, usize)> = Vec::new();
        for row in &self.rows {
            let cell = &row[index];
            if cell.is_null() {
                continue;
            }
            match order.iter_mut().find(|(value, _)| cells_equal(value, cell)) {
                Some((_, count)) => *count += 1,
                None => order.push((cell.clone(), 1)),
            }
        }
        // 稳定排序，次数相同时保持首次出现顺序
        order.sort_by(|a, b| b.1.cmp(&a.1));
        if let Some(n) = top_n {
            order.truncate(n);
        }

        let total: usize = self.rows.iter().filter(|r| !r[index].is_null()).count();
        let label = if normalize { "proportion" } else { "count" };
        let rows = order
            .into_iter()
            .map(|(value, count)| {
                let measure = if normalize {
                    number_json(count as f64 / total.max(1) as f64)
                } else {
                    JsonValue::from(count)
                };
                vec![value, measure]
            })
            .collect();

        Ok(Table::new(vec![column.to_string(), label.to_string()], rows))
    }

    /// 按列排序，空值总在最后
    pub fn sort_by(&self, column: &str, ascending: bool) -> TableResult<Table> {
        let index = self.column_index(column)?;
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            let (x, y) = (&a[index], &b[index]);
            match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                _ if ascending => compare_cells(x, y),
                _ => compare_cells(y, x),
            }
        });
        Ok(Table::new(self.columns.clone(), rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> Table {
        Table::from_csv(
            b"region,product,amount\nnorth,a,10\nsouth,b,5.5\nnorth,c,20\n\"west, far\",a,\nsouth,a,4.5\n",
        )
        .unwrap()
    }

    #[test]
    fn csv_parsing_infers_types() {
        let table = sales();
        assert_eq!(table.columns, vec!["region", "product", "amount"]);
        assert_eq!(table.len(), 5);
        assert_eq!(table.rows[0][2], json!(10));
        assert_eq!(table.rows[1][2], json!(5.5));
        assert_eq!(table.rows[3][0], json!("west, far"));
        assert!(table.rows[3][2].is_null());
        assert_eq!(table.numeric_columns(), vec!["amount"]);
    }

    #[test]
    fn quoted_fields_and_ragged_rows() {
        let table = Table::from_csv(
            "\u{feff}note,n\r\n\"line one\nline two\",1\r\n\"say \"\"hi\"\"\",2\r\nshort\r\n".as_bytes(),
        )
        .unwrap();
        assert_eq!(table.columns, vec!["note", "n"]);
        assert_eq!(table.rows[0][0], json!("line one\nline two"));
        assert_eq!(table.rows[1][0], json!("say \"hi\""));
        assert!(table.rows[2][1].is_null());

        let err = Table::from_csv(b"a,b\n1,2\n3,4,5\n").unwrap_err();
        assert!(matches!(err, TableError::Malformed { line: 3, .. }), "{:?}", err);
    }

    #[test]
    fn non_utf8_and_empty_input() {
        assert_eq!(Table::from_csv(b"a,b\n\xff\xfe,1\n").unwrap_err(), TableError::NotUtf8);
        assert_eq!(Table::from_csv(b"").unwrap_err(), TableError::Empty);
    }

    #[test]
    fn json_shapes() {
        let records = Table::from_json(&json!([{"a": 1, "b": 2}, {"a": 3, "c": 4}])).unwrap();
        assert_eq!(records.columns, vec!["a", "b", "c"]);
        assert!(records.rows[1][1].is_null());

        let columnar = Table::from_json(&json!({"x": [1, 2], "y": [3, 4]})).unwrap();
        assert_eq!(columnar.len(), 2);

        assert!(Table::from_json(&json!({"answer": 42})).is_none());
        assert!(Table::from_json(&json!([1, 2, 3])).is_none());
    }

    #[test]
    fn filter_with_multiple_conditions() {
        let table = sales();
        let filtered = table
            .filter(&[
                Condition {
                    column: "region".into(),
                    op: FilterOp::In,
                    value: json!(["north", "south"]),
                },
                Condition {
                    column: "amount".into(),
                    op: FilterOp::Ge,
                    value: json!(5),
                },
            ])
            .unwrap();
        assert_eq!(filtered.len(), 3);

        let contains = table
            .filter(&[Condition {
                column: "region".into(),
                op: FilterOp::Contains,
                value: json!("far"),
            }])
            .unwrap();
        assert_eq!(contains.len(), 1);

        let err = table
            .filter(&[Condition {
                column: "missing".into(),
                op: FilterOp::Eq,
                value: json!(1),
            }])
            .unwrap_err();
        assert_eq!(err, TableError::UnknownColumn("missing".into()));
    }

    #[test]
    fn aggregate_scalar_and_grouped() {
        let table = sales();
        let ops = vec![("amount".to_string(), AggFunc::Sum)];
        match table.aggregate(&ops, None).unwrap() {
            Aggregated::Scalar(value) => assert_eq!(value, json!({"amount": 40})),
            other => panic!("unexpected {:?}", other),
        }

        let ops = vec![("amount".to_string(), AggFunc::Mean)];
        match table.aggregate(&ops, Some("region")).unwrap() {
            Aggregated::Grouped(grouped) => {
                assert_eq!(grouped.columns, vec!["region", "amount"]);
                assert_eq!(grouped.rows[0], vec![json!("north"), json!(15)]);
                assert_eq!(grouped.rows[1], vec![json!("south"), json!(5)]);
                assert!(grouped.rows[2][1].is_null());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn statistics_and_median() {
        let stats = sales().statistics(None).unwrap();
        assert_eq!(stats["amount"]["count"], json!(4));
        assert_eq!(stats["amount"]["median"], json!(7.75));
        assert_eq!(stats["amount"]["max"], json!(20));
    }

    #[test]
    fn correlation_of_linear_columns() {
        let table = Table::from_csv(b"x,y\n1,2\n2,4\n3,6\n").unwrap();
        let matrix = table.correlation(None).unwrap();
        assert_eq!(matrix.rows[0][2], json!(1));
    }

    #[test]
    fn value_counts_and_sort() {
        let table = sales();
        let counts = table.value_counts("product", false, Some(1)).unwrap();
        assert_eq!(counts.rows, vec![vec![json!("a"), json!(3)]]);

        let sorted = table.sort_by("amount", false).unwrap();
        assert_eq!(sorted.rows[0][2], json!(20));
        assert!(sorted.rows[4][2].is_null());
    }
}
