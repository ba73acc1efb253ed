//! 图表渲染 - 业务能力层
//!
//! 把表格画成 SVG，再光栅化为 PNG，编码为 `data:image/png;base64,...` 形式的 data URI。

use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

use base64::{engine::general_purpose, Engine as _};
use resvg::{tiny_skia, usvg};
use tracing::debug;

use crate::services::data_tools::{as_f64, cell_text, Table, TableError, TableResult};

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 400.0;
const MARGIN: f64 = 50.0;
const PALETTE: &[&str] = &[
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7",
];

/// 图表类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Pie,
}

impl ChartKind {
    pub fn parse(name: &str) -> TableResult<Self> {
        Ok(match name {
            "bar" => ChartKind::Bar,
            "line" => ChartKind::Line,
            "scatter" => ChartKind::Scatter,
            "pie" => ChartKind::Pie,
            other => return Err(TableError::Unsupported(format!("图表类型 {}", other))),
        })
    }
}

/// 图表配置
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartConfig {
    /// 横轴（饼图为标签）列，缺省取第一列
    pub x: Option<String>,
    /// 纵轴（饼图为数值）列，缺省取第一个与 x 不同的数值列
    pub y: Option<String>,
    pub title: Option<String>,
}

/// 渲染图表并返回 PNG data URI
pub fn render_chart(table: &Table, kind: ChartKind, config: &ChartConfig) -> TableResult<String> {
    let png = render_png(table, kind, config)?;
    Ok(format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(png)))
}

/// 渲染图表为 PNG 字节
pub fn render_png(table: &Table, kind: ChartKind, config: &ChartConfig) -> TableResult<Vec<u8>> {
    let svg = render_svg(table, kind, config)?;
    let options = usvg::Options {
        fontdb: font_database(),
        ..usvg::Options::default()
    };
    let tree = usvg::Tree::from_str(&svg, &options).map_err(|e| TableError::Chart(e.to_string()))?;

    let size = tree.size().to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| TableError::Chart(format!("画布尺寸无效: {}x{}", size.width(), size.height())))?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    let png = pixmap.encode_png().map_err(|e| TableError::Chart(e.to_string()))?;
    debug!("图表 PNG {} 字节", png.len());
    Ok(png)
}

/// 系统字体只加载一次；没有可用字体时文字不绘制
fn font_database() -> Arc<usvg::fontdb::Database> {
    static FONTS: OnceLock<Arc<usvg::fontdb::Database>> = OnceLock::new();
    FONTS
        .get_or_init(|| {
            let mut db = usvg::fontdb::Database::new();
            db.load_system_fonts();
            debug!("加载系统字体 {} 个", db.len());
            Arc::new(db)
        })
        .clone()
}

/// 渲染图表为 SVG 文本
pub fn render_svg(table: &Table, kind: ChartKind, config: &ChartConfig) -> TableResult<String> {
    if table.is_empty() {
        return Err(TableError::Empty);
    }
    let x_column = match &config.x {
        Some(x) => x.clone(),
        None => table.columns.first().cloned().ok_or(TableError::Empty)?,
    };
    let y_column = match &config.y {
        Some(y) => y.clone(),
        None => table
            .numeric_columns()
            .into_iter()
            .find(|c| *c != x_column)
            .ok_or_else(|| TableError::NotNumeric(x_column.clone()))?,
    };
    let x_index = table.column_index(&x_column)?;
    let y_index = table.column_index(&y_column)?;

    let points: Vec<(String, Option<f64>, f64)> = table
        .rows
        .iter()
        .filter_map(|row| {
            let y = as_f64(&row[y_index])?;
            Some((cell_text(&row[x_index]), as_f64(&row[x_index]), y))
        })
        .collect();
    if points.is_empty() {
        return Err(TableError::NotNumeric(y_column));
    }

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = WIDTH,
        h = HEIGHT
    );
    svg.push_str(r#"<rect width="100%" height="100%" fill="white"/>"#);
    if let Some(title) = &config.title {
        let _ = write!(
            svg,
            r#"<text x="{}" y="25" text-anchor="middle" font-size="16">{}</text>"#,
            WIDTH / 2.0,
            escape_xml(title)
        );
    }

    match kind {
        ChartKind::Bar => draw_bars(&mut svg, &points),
        ChartKind::Line => draw_line(&mut svg, &points),
        ChartKind::Scatter => draw_scatter(&mut svg, &points, &x_column)?,
        ChartKind::Pie => draw_pie(&mut svg, &points)?,
    }
    if kind != ChartKind::Pie {
        draw_axes(&mut svg, &x_column, &y_column);
    }

    svg.push_str("</svg>");
    Ok(svg)
}

fn plot_width() -> f64 {
    WIDTH - 2.0 * MARGIN
}

fn plot_height() -> f64 {
    HEIGHT - 2.0 * MARGIN
}

/// 数值映射到画布纵坐标，范围总是包含 0
fn y_scale(values: impl Iterator<Item = f64> + Clone) -> impl Fn(f64) -> f64 {
    let max = values.clone().fold(0.0_f64, f64::max);
    let min = values.fold(0.0_f64, f64::min);
    let span = if max - min > 0.0 { max - min } else { 1.0 };
    move |v| HEIGHT - MARGIN - (v - min) / span * plot_height()
}

fn draw_axes(svg: &mut String, x_label: &str, y_label: &str) {
    let _ = write!(
        svg,
        r#"<line x1="{m}" y1="{b}" x2="{r}" y2="{b}" stroke="black"/><line x1="{m}" y1="{m}" x2="{m}" y2="{b}" stroke="black"/>"#,
        m = MARGIN,
        b = HEIGHT - MARGIN,
        r = WIDTH - MARGIN
    );
    let _ = write!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="middle" font-size="12">{}</text>"#,
        WIDTH / 2.0,
        HEIGHT - 10.0,
        escape_xml(x_label)
    );
    let _ = write!(
        svg,
        r#"<text x="15" y="{}" text-anchor="middle" font-size="12" transform="rotate(-90 15 {})">{}</text>"#,
        HEIGHT / 2.0,
        HEIGHT / 2.0,
        escape_xml(y_label)
    );
}

fn draw_bars(svg: &mut String, points: &[(String, Option<f64>, f64)]) {
    let scale = y_scale(points.iter().map(|p| p.2));
    let zero = scale(0.0);
    let slot = plot_width() / points.len() as f64;
    for (i, (label, _, value)) in points.iter().enumerate() {
        let top = scale(*value);
        let x = MARGIN + slot * i as f64 + slot * 0.1;
        let _ = write!(
            svg,
            r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}"><title>{}: {}</title></rect>"#,
            x,
            top.min(zero),
            slot * 0.8,
            (zero - top).abs(),
            PALETTE[0],
            escape_xml(label),
            value
        );
        let _ = write!(
            svg,
            r#"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-size="10">{}</text>"#,
            x + slot * 0.4,
            HEIGHT - MARGIN + 14.0,
            escape_xml(label)
        );
    }
}

fn draw_line(svg: &mut String, points: &[(String, Option<f64>, f64)]) {
    let scale = y_scale(points.iter().map(|p| p.2));
    let step = if points.len() > 1 {
        plot_width() / (points.len() - 1) as f64
    } else {
        0.0
    };
    let coords: Vec<String> = points
        .iter()
        .enumerate()
        .map(|(i, (_, _, v))| format!("{:.2},{:.2}", MARGIN + step * i as f64, scale(*v)))
        .collect();
    let _ = write!(
        svg,
        r#"<polyline fill="none" stroke="{}" stroke-width="2" points="{}"/>"#,
        PALETTE[0],
        coords.join(" ")
    );
}

fn draw_scatter(svg: &mut String, points: &[(String, Option<f64>, f64)], x_column: &str) -> TableResult<()> {
    let pairs: Vec<(f64, f64)> = points.iter().filter_map(|(_, x, y)| Some(((*x)?, *y))).collect();
    if pairs.is_empty() {
        return Err(TableError::NotNumeric(x_column.to_string()));
    }
    let x_min = pairs.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let x_max = pairs.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let x_span = if x_max - x_min > 0.0 { x_max - x_min } else { 1.0 };
    let scale = y_scale(pairs.iter().map(|p| p.1));
    for (x, y) in &pairs {
        let _ = write!(
            svg,
            r#"<circle cx="{:.2}" cy="{:.2}" r="4" fill="{}" fill-opacity="0.6"/>"#,
            MARGIN + (x - x_min) / x_span * plot_width(),
            scale(*y),
            PALETTE[0]
        );
    }
    Ok(())
}

fn draw_pie(svg: &mut String, points: &[(String, Option<f64>, f64)]) -> TableResult<()> {
    let total: f64 = points.iter().map(|p| p.2.max(0.0)).sum();
    if total <= 0.0 {
        return Err(TableError::Unsupported("饼图数值之和必须大于 0".to_string()));
    }
    let (cx, cy, r) = (WIDTH / 2.0, HEIGHT / 2.0 + 10.0, HEIGHT / 2.0 - MARGIN);
    let mut angle = -std::f64::consts::FRAC_PI_2;
    for (i, (label, _, value)) in points.iter().enumerate() {
        let share = value.max(0.0) / total;
        if share <= 0.0 {
            continue;
        }
        let color = PALETTE[i % PALETTE.len()];
        if share >= 1.0 {
            let _ = write!(svg, r#"<circle cx="{}" cy="{}" r="{}" fill="{}"/>"#, cx, cy, r, color);
        } else {
            let end = angle + share * std::f64::consts::TAU;
            let large = if share > 0.5 { 1 } else { 0 };
            let _ = write!(
                svg,
                r#"<path d="M {cx:.2} {cy:.2} L {x1:.2} {y1:.2} A {r:.2} {r:.2} 0 {large} 1 {x2:.2} {y2:.2} Z" fill="{color}"><title>{label}: {pct:.1}%</title></path>"#,
                x1 = cx + r * angle.cos(),
                y1 = cy + r * angle.sin(),
                x2 = cx + r * end.cos(),
                y2 = cy + r * end.sin(),
                label = escape_xml(label),
                pct = share * 100.0,
            );
            angle = end;
        }
    }
    Ok(())
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
