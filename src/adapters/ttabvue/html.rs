//! 表格導向的 HTML 掃描器。
//!
//! TTABVue 頁面是巢狀表格排版，這裡只抽出列 (`<tr>`)、儲存格 (`<td>`/`<th>`)
//! 與連結，其他標籤一律忽略。省略結束標籤的寫法也能容忍。

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<!--.*?-->|<(script|style)\b[^>]*>.*?</(?:script|style)\s*>|<(/?)([a-z][a-z0-9]*)([^>]*)>",
    )
    .expect("tag pattern is valid")
});

static CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bclass\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("class pattern is valid")
});

static HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("href pattern is valid")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlLink {
    pub href: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlCell {
    pub header: bool,
    pub classes: Vec<String>,
    pub text: String,
    pub links: Vec<HtmlLink>,
}

impl HtmlCell {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c.eq_ignore_ascii_case(class))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlRow {
    /// 所屬表格的編號（依開啟順序，0 表示不在任何表格內）
    pub table: usize,
    pub cells: Vec<HtmlCell>,
}

impl HtmlRow {
    pub fn text(&self) -> String {
        self.cells
            .iter()
            .map(|cell| cell.text.as_str())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 找出以 `label` 開頭的儲存格，回傳其後第一個非空儲存格
    pub fn value_after(&self, label: &str) -> Option<&HtmlCell> {
        let label = label.to_lowercase();
        let position = self
            .cells
            .iter()
            .position(|cell| cell.text.to_lowercase().starts_with(&label))?;
        self.cells[position + 1..]
            .iter()
            .find(|cell| !cell.text.is_empty() || !cell.links.is_empty())
    }

    pub fn has_label(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.cells
            .iter()
            .any(|cell| cell.text.to_lowercase().starts_with(&label))
    }

    /// 帶有指定 class 的非空儲存格文字
    pub fn class_text(&self, class: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|cell| cell.has_class(class) && !cell.text.is_empty())
            .map(|cell| cell.text.as_str())
    }

    pub fn links(&self) -> impl Iterator<Item = &HtmlLink> {
        self.cells.iter().flat_map(|cell| cell.links.iter())
    }
}

pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn attribute(re: &Regex, attrs: &str) -> Option<String> {
    let caps = re.captures(attrs)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| decode_entities(m.as_str()))
}

#[derive(Default)]
struct Scanner {
    rows: Vec<HtmlRow>,
    tables: usize,
    table_stack: Vec<usize>,
    row_stack: Vec<usize>,
    cell_stack: Vec<(usize, usize)>,
    link: Option<HtmlLink>,
}

impl Scanner {
    fn current_table(&self) -> usize {
        self.table_stack.last().copied().unwrap_or(0)
    }

    fn push_text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let text = decode_entities(raw);
        if let Some(&(row, cell)) = self.cell_stack.last() {
            self.rows[row].cells[cell].text.push_str(&text);
        }
        if let Some(link) = self.link.as_mut() {
            link.text.push_str(&text);
        }
    }

    fn close_row(&mut self) {
        if let Some(row) = self.row_stack.pop() {
            self.cell_stack.retain(|&(r, _)| r != row);
        }
    }

    fn open_row(&mut self) {
        // 同一表格內未關閉的列視為已結束
        let table = self.current_table();
        if let Some(&open) = self.row_stack.last() {
            if self.rows[open].table == table {
                self.close_row();
            }
        }
        self.rows.push(HtmlRow {
            table,
            cells: Vec::new(),
        });
        self.row_stack.push(self.rows.len() - 1);
    }

    fn open_cell(&mut self, header: bool, attrs: &str) {
        let Some(&row) = self.row_stack.last() else {
            return;
        };
        if matches!(self.cell_stack.last(), Some(&(r, _)) if r == row) {
            self.cell_stack.pop();
        }
        let classes = attribute(&CLASS_RE, attrs)
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        self.rows[row].cells.push(HtmlCell {
            header,
            classes,
            ..HtmlCell::default()
        });
        self.cell_stack.push((row, self.rows[row].cells.len() - 1));
    }

    fn close_link(&mut self) {
        let Some(mut link) = self.link.take() else {
            return;
        };
        link.text = collapse_whitespace(&link.text);
        if let Some(&(row, cell)) = self.cell_stack.last() {
            self.rows[row].cells[cell].links.push(link);
        }
    }

    fn handle_tag(&mut self, name: &str, closing: bool, attrs: &str) {
        match (name, closing) {
            ("table", false) => {
                self.tables += 1;
                self.table_stack.push(self.tables);
            }
            ("table", true) => {
                let table = self.table_stack.pop().unwrap_or(0);
                while matches!(self.row_stack.last(), Some(&row) if self.rows[row].table == table) {
                    self.close_row();
                }
            }
            ("tr", false) => self.open_row(),
            ("tr", true) => self.close_row(),
            ("td", false) | ("th", false) => self.open_cell(name == "th", attrs),
            ("td", true) | ("th", true) => {
                self.cell_stack.pop();
            }
            ("a", false) => {
                self.close_link();
                self.link = attribute(&HREF_RE, attrs).map(|href| HtmlLink {
                    href,
                    text: String::new(),
                });
            }
            ("a", true) => self.close_link(),
            ("br", _) | ("p", _) | ("div", _) | ("li", _) => self.push_text(" "),
            _ => {}
        }
    }

    fn finish(mut self) -> Vec<HtmlRow> {
        self.close_link();
        for row in &mut self.rows {
            for cell in &mut row.cells {
                cell.text = collapse_whitespace(&cell.text);
            }
        }
        self.rows
    }
}

/// 依文件順序回傳所有表格列（巢狀表格的列各自獨立）
pub fn scan_rows(html: &str) -> Vec<HtmlRow> {
    let mut scanner = Scanner::default();
    let mut cursor = 0;

    for caps in TAG_RE.captures_iter(html) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        scanner.push_text(&html[cursor..whole.start()]);
        cursor = whole.end();

        let Some(name) = caps.get(3) else {
            continue;
        };
        let closing = caps.get(2).is_some_and(|m| !m.as_str().is_empty());
        let attrs = caps.get(4).map_or("", |m| m.as_str());
        scanner.handle_tag(&name.as_str().to_ascii_lowercase(), closing, attrs);
    }
    scanner.push_text(&html[cursor..]);

    scanner.finish()
}
