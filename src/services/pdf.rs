//! PDF 提取 - 业务能力层
//!
//! 按页提取文本；表格按行识别：连续若干行切分出的列数一致即视为一张表，首行作为表头。

use lopdf::Document;
use tracing::{debug, info};

use crate::services::data_tools::{infer_cell, Table, TableError, TableResult};

/// 已加载的 PDF 文档
pub struct PdfDocument {
    document: Document,
}

impl PdfDocument {
    pub fn load(bytes: &[u8]) -> TableResult<Self> {
        let document = Document::load_mem(bytes).map_err(|e| TableError::Pdf(e.to_string()))?;
        debug!("PDF 共 {} 页", document.get_pages().len());
        Ok(Self { document })
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// 提取文本
    ///
    /// # 参数
    /// - `page`: 页码（从 1 开始）；`None` 表示全部页，页与页之间空一行
    pub fn text(&self, page: Option<u32>) -> TableResult<String> {
        let mut chunks = Vec::new();
        for number in self.page_numbers(page)? {
            let text = self.page_text(number)?;
            let text = text.trim();
            if !text.is_empty() {
                chunks.push(text.to_string());
            }
        }
        let text = chunks.join("\n\n");
        info!("📄 提取 PDF 文本 {} 字符", text.chars().count());
        Ok(text)
    }

    /// 提取第一张表格
    ///
    /// # 参数
    /// - `page`: 页码（从 1 开始）；`None` 表示依次查找所有页
    ///
    /// # 返回
    /// 找不到表格时返回 [`TableError::NoTable`]
    pub fn table(&self, page: Option<u32>) -> TableResult<Table> {
        for number in self.page_numbers(page)? {
            if let Some(table) = detect_table(&self.page_text(number)?) {
                info!(
                    "📄 第 {} 页识别到表格: {} 列 × {} 行",
                    number,
                    table.columns.len(),
                    table.len()
                );
                return Ok(table);
            }
        }
        Err(TableError::NoTable)
    }

    fn page_text(&self, number: u32) -> TableResult<String> {
        self.document
            .extract_text(&[number])
            .map_err(|e| TableError::Pdf(format!("第 {} 页: {}", number, e)))
    }

    fn page_numbers(&self, page: Option<u32>) -> TableResult<Vec<u32>> {
        let total = self.page_count();
        match page {
            Some(p) if p == 0 || p as usize > total => Err(TableError::PageOutOfRange { page: p, total }),
            Some(p) => Ok(vec![p]),
            None => Ok(self.document.get_pages().keys().copied().collect()),
        }
    }
}

/// 从一页文本中识别表格
///
/// 先按制表符或连续空格切分单元格，识别不到再按单个空白切分。
pub fn detect_table(text: &str) -> Option<Table> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    detect_with(&lines, split_wide).or_else(|| detect_with(&lines, split_words))
}

fn detect_with(lines: &[&str], split: fn(&str) -> Vec<String>) -> Option<Table> {
    let rows: Vec<Vec<String>> = lines.iter().map(|line| split(line)).collect();
    let mut start = 0;
    while start < rows.len() {
        let width = rows[start].len();
        let end = start + rows[start..].iter().take_while(|r| r.len() == width).count();
        if width >= 2 && end - start >= 2 {
            let columns = rows[start].clone();
            let body = rows[start + 1..end]
                .iter()
                .map(|row| row.iter().map(|cell| infer_cell(cell)).collect())
                .collect();
            return Some(Table::new(columns, body));
        }
        start = end;
    }
    None
}

fn split_wide(line: &str) -> Vec<String> {
    let separator = if line.contains('\t') { "\t" } else { "  " };
    line.split(separator)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_words(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use serde_json::json;

    /// 生成测试用 PDF，每页若干行文本
    pub(crate) fn sample_pdf(pages: &[&[&str]]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for lines in pages {
            let mut operations = Vec::new();
            for (i, line) in lines.iter().enumerate() {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
                operations.push(Operation::new("Td", vec![50.into(), (800 - 20 * i as i64).into()]));
                operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
                operations.push(Operation::new("ET", vec![]));
            }
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn text_by_page_and_whole_document() {
        let bytes = sample_pdf(&[&["Quarterly report"], &["Second page"]]);
        let pdf = PdfDocument::load(&bytes).unwrap();
        assert_eq!(pdf.page_count(), 2);
        assert!(pdf.text(Some(2)).unwrap().contains("Second page"));

        let all = pdf.text(None).unwrap();
        assert!(all.contains("Quarterly report"));
        assert!(all.find("Quarterly").unwrap() < all.find("Second").unwrap());
    }

    #[test]
    fn table_found_after_prose() {
        let bytes = sample_pdf(&[
            &["Cover page"],
            &["Sales by region", "region  amount", "north  10", "south  32.5"],
        ]);
        let table = PdfDocument::load(&bytes).unwrap().table(None).unwrap();
        assert_eq!(table.columns, vec!["region", "amount"]);
        assert_eq!(table.rows, vec![vec![json!("north"), json!(10)], vec![json!("south"), json!(32.5)]]);
    }

    #[test]
    fn page_bounds_and_missing_tables() {
        let bytes = sample_pdf(&[&["just one line"]]);
        let pdf = PdfDocument::load(&bytes).unwrap();
        assert_eq!(pdf.text(Some(3)).unwrap_err(), TableError::PageOutOfRange { page: 3, total: 1 });
        assert_eq!(pdf.table(Some(1)).unwrap_err(), TableError::NoTable);
        assert!(matches!(PdfDocument::load(b"not a pdf"), Err(TableError::Pdf(_))));
    }

    #[test]
    fn detection_prefers_wide_gaps() {
        let table = detect_table("name  city\nAda Lovelace  London\nAlan Turing  Wilmslow\n").unwrap();
        assert_eq!(table.columns, vec!["name", "city"]);
        assert_eq!(table.rows[0][0], json!("Ada Lovelace"));

        let table = detect_table("x y\n1 2\n3 4").unwrap();
        assert_eq!(table.rows[1], vec![json!(3), json!(4)]);
        assert!(detect_table("single\ncolumn").is_none());
    }
}
