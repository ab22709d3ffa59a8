#![cfg(feature = "web")]
use plotters::coord::Shift;
use plotters::prelude::*;
use std::error::Error;

use crate::aggregate::{GroupTotal, HierarchyNode, MonthTotal, ScatterPoint, format_currency};
use crate::session::DashboardView;

const PALETTE: [RGBColor; 10] = [
    RGBColor(76, 114, 176),
    RGBColor(221, 132, 82),
    RGBColor(85, 168, 104),
    RGBColor(196, 78, 82),
    RGBColor(129, 114, 179),
    RGBColor(147, 120, 96),
    RGBColor(218, 139, 195),
    RGBColor(140, 140, 140),
    RGBColor(204, 185, 116),
    RGBColor(100, 181, 205),
];

/// Available graph types supported by the dashboard
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GraphType {
    /// Vertical bars, one per group, labelled with the formatted total
    Bar,

    /// Pie with the given fraction of the radius cut out (0.0 for a full pie)
    Pie { hole: f64 },

    /// Values joined in order, one point per label
    Line,

    /// Bubbles sized by quantity
    Scatter,

    /// Nested rectangles with areas proportional to the values
    Treemap,
}

/// Configuration options for graph generation
#[derive(Clone, Debug)]
pub struct GraphOptions {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub width: u32,
    pub height: u32,
    pub graph_type: GraphType,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            title: "Graph".to_string(),
            x_label: String::new(),
            y_label: String::new(),
            width: 800,
            height: 500,
            graph_type: GraphType::Bar,
        }
    }
}

impl GraphOptions {
    fn titled(title: &str, graph_type: GraphType) -> Self {
        Self {
            title: title.to_string(),
            graph_type,
            ..Self::default()
        }
    }
}

/// The fixed set of charts on the dashboard
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chart {
    Category,
    Region,
    TimeSeries,
    Treemap,
    Segment,
    CategoryPie,
    Scatter,
}

impl Chart {
    pub const ALL: [Chart; 7] = [
        Chart::Category,
        Chart::Region,
        Chart::TimeSeries,
        Chart::Treemap,
        Chart::Segment,
        Chart::CategoryPie,
        Chart::Scatter,
    ];

    /// Looks up a chart by the short name used in URLs
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().trim_end_matches(".svg") {
            "category" => Some(Chart::Category),
            "region" => Some(Chart::Region),
            "timeseries" => Some(Chart::TimeSeries),
            "treemap" => Some(Chart::Treemap),
            "segment" => Some(Chart::Segment),
            "category_pie" => Some(Chart::CategoryPie),
            "scatter" => Some(Chart::Scatter),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Chart::Category => "category",
            Chart::Region => "region",
            Chart::TimeSeries => "timeseries",
            Chart::Treemap => "treemap",
            Chart::Segment => "segment",
            Chart::CategoryPie => "category_pie",
            Chart::Scatter => "scatter",
        }
    }

    pub fn options(&self) -> GraphOptions {
        match self {
            Chart::Category => GraphOptions {
                x_label: "Category".to_string(),
                y_label: "Sales".to_string(),
                ..GraphOptions::titled("Category wise Sales", GraphType::Bar)
            },
            Chart::Region => {
                GraphOptions::titled("Region wise Sales", GraphType::Pie { hole: 0.5 })
            }
            Chart::TimeSeries => GraphOptions {
                x_label: "month_year".to_string(),
                y_label: "Amount".to_string(),
                width: 1000,
                ..GraphOptions::titled("Time Series Analysis", GraphType::Line)
            },
            Chart::Treemap => GraphOptions {
                height: 650,
                ..GraphOptions::titled("Hierarchical view of Sales", GraphType::Treemap)
            },
            Chart::Segment => {
                GraphOptions::titled("Segment wise Sales", GraphType::Pie { hole: 0.0 })
            }
            Chart::CategoryPie => {
                GraphOptions::titled("Category wise Sales", GraphType::Pie { hole: 0.0 })
            }
            Chart::Scatter => GraphOptions {
                x_label: "Sales".to_string(),
                y_label: "Profit".to_string(),
                ..GraphOptions::titled(
                    "Relationship between Sales and Profits",
                    GraphType::Scatter,
                )
            },
        }
    }

    /// Renders this chart for a dashboard view as an SVG document
    pub fn render(&self, view: &DashboardView) -> Result<String, Box<dyn Error>> {
        let options = self.options();
        match self {
            Chart::Category => bar_chart(&view.sales_by_category, &options),
            Chart::Region => pie_chart(&view.sales_by_region, &options),
            Chart::TimeSeries => line_chart(&view.monthly_sales, &options),
            Chart::Treemap => treemap_chart(&view.hierarchy, &options),
            Chart::Segment => pie_chart(&view.sales_by_segment, &options),
            Chart::CategoryPie => pie_chart(&view.sales_by_category, &options),
            Chart::Scatter => scatter_chart(&view.scatter, &options),
        }
    }
}

type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;

/// Draws onto a fresh white SVG canvas and returns the document
fn render_svg<F>(options: &GraphOptions, draw: F) -> Result<String, Box<dyn Error>>
where
    F: FnOnce(&Area) -> Result<(), Box<dyn Error>>,
{
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        root.fill(&WHITE)?;
        draw(&root)?;
        root.present()?;
    }
    Ok(svg)
}

fn draw_no_data(root: &Area, options: &GraphOptions) -> Result<(), Box<dyn Error>> {
    let area = root.titled(&options.title, ("sans-serif", 24))?;
    let (w, h) = area.dim_in_pixel();
    area.draw(&Text::new(
        "No data",
        (w as i32 / 2 - 35, h as i32 / 2),
        ("sans-serif", 20).into_font().color(&BLACK.mix(0.5)),
    ))?;
    Ok(())
}

fn label_at(labels: &[String], value: &SegmentValue<i32>) -> String {
    match value {
        SegmentValue::CenterOf(i) => labels.get(*i as usize).cloned().unwrap_or_default(),
        _ => String::new(),
    }
}

/// Vertical bar chart of group totals, each bar captioned with its currency total
pub fn bar_chart(totals: &[GroupTotal], options: &GraphOptions) -> Result<String, Box<dyn Error>> {
    render_svg(options, |root| {
        if totals.is_empty() {
            return draw_no_data(root, options);
        }

        let labels: Vec<String> = totals.iter().map(|t| t.key.clone()).collect();
        let max_y = totals.iter().map(|t| t.sales).fold(0.0, f64::max);
        let min_y = totals.iter().map(|t| t.sales).fold(0.0, f64::min);
        let top = if max_y > 0.0 { max_y * 1.15 } else { 1.0 };

        let mut chart = ChartBuilder::on(root)
            .caption(&options.title, ("sans-serif", 24).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d((0..totals.len() as i32).into_segmented(), min_y..top)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_desc(&options.x_label)
            .y_desc(&options.y_label)
            .x_label_formatter(&|v| label_at(&labels, v))
            .draw()?;

        chart.draw_series(totals.iter().enumerate().map(|(i, t)| {
            let i = i as i32;
            let mut bar = Rectangle::new(
                [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), t.sales)],
                PALETTE[0].filled(),
            );
            bar.set_margin(0, 0, 12, 12);
            bar
        }))?;

        chart.draw_series(totals.iter().enumerate().map(|(i, t)| {
            Text::new(
                format_currency(t.sales),
                (SegmentValue::CenterOf(i as i32), t.sales),
                ("sans-serif", 14).into_font(),
            )
        }))?;

        Ok(())
    })
}

/// Pie or donut chart of group totals; negative totals count as zero
pub fn pie_chart(totals: &[GroupTotal], options: &GraphOptions) -> Result<String, Box<dyn Error>> {
    let hole = match options.graph_type {
        GraphType::Pie { hole } => hole.clamp(0.0, 0.9),
        _ => 0.0,
    };

    render_svg(options, |root| {
        let sizes: Vec<f64> = totals.iter().map(|t| t.sales.max(0.0)).collect();
        if sizes.iter().sum::<f64>() <= 0.0 {
            return draw_no_data(root, options);
        }

        let area = root.titled(&options.title, ("sans-serif", 24))?;
        let (w, h) = area.dim_in_pixel();
        let center = (w as i32 / 2, h as i32 / 2);
        let radius = f64::from(w.min(h)) * 0.35;
        let colors: Vec<RGBColor> = (0..totals.len())
            .map(|i| PALETTE[i % PALETTE.len()])
            .collect();
        let labels: Vec<String> = totals.iter().map(|t| t.key.clone()).collect();

        let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
        pie.label_style(("sans-serif", 15).into_font().color(&BLACK));
        pie.percentages(("sans-serif", 13).into_font().color(&WHITE));
        if hole > 0.0 {
            pie.donut_hole(radius * hole);
        }
        area.draw(&pie)?;
        Ok(())
    })
}

/// Line chart of monthly totals in the order given
pub fn line_chart(months: &[MonthTotal], options: &GraphOptions) -> Result<String, Box<dyn Error>> {
    render_svg(options, |root| {
        if months.is_empty() {
            return draw_no_data(root, options);
        }

        let labels: Vec<String> = months.iter().map(|m| m.month_year.clone()).collect();
        let max_y = months.iter().map(|m| m.sales).fold(0.0, f64::max);
        let min_y = months.iter().map(|m| m.sales).fold(0.0, f64::min);
        let top = if max_y > 0.0 { max_y * 1.1 } else { 1.0 };

        let mut chart = ChartBuilder::on(root)
            .caption(&options.title, ("sans-serif", 24).into_font())
            .margin(10)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d((0..months.len() as i32).into_segmented(), min_y..top)?;

        chart
            .configure_mesh()
            .x_labels(months.len().min(24))
            .x_desc(&options.x_label)
            .y_desc(&options.y_label)
            .x_label_formatter(&|v| label_at(&labels, v))
            .draw()?;

        chart.draw_series(LineSeries::new(
            months
                .iter()
                .enumerate()
                .map(|(i, m)| (SegmentValue::CenterOf(i as i32), m.sales)),
            &PALETTE[0],
        ))?;
        chart.draw_series(months.iter().enumerate().map(|(i, m)| {
            Circle::new(
                (SegmentValue::CenterOf(i as i32), m.sales),
                3,
                PALETTE[0].filled(),
            )
        }))?;

        Ok(())
    })
}

/// Sales against profit, one bubble per order
pub fn scatter_chart(
    points: &[ScatterPoint],
    options: &GraphOptions,
) -> Result<String, Box<dyn Error>> {
    render_svg(options, |root| {
        if points.is_empty() {
            return draw_no_data(root, options);
        }

        let max_x = points.iter().map(|p| p.sales).fold(0.0, f64::max);
        let min_x = points.iter().map(|p| p.sales).fold(0.0, f64::min);
        let max_y = points.iter().map(|p| p.profit).fold(0.0, f64::max);
        let min_y = points.iter().map(|p| p.profit).fold(0.0, f64::min);
        let pad_x = ((max_x - min_x) * 0.05).max(1.0);
        let pad_y = ((max_y - min_y) * 0.05).max(1.0);

        let mut chart = ChartBuilder::on(root)
            .caption(&options.title, ("sans-serif", 20).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(
                (min_x - pad_x)..(max_x + pad_x),
                (min_y - pad_y)..(max_y + pad_y),
            )?;

        chart
            .configure_mesh()
            .x_desc(&options.x_label)
            .y_desc(&options.y_label)
            .axis_desc_style(("sans-serif", 19))
            .draw()?;

        chart.draw_series(points.iter().map(|p| {
            let radius = 2 + p.quantity.clamp(0, 14) as u32;
            Circle::new((p.sales, p.profit), radius, PALETTE[0].mix(0.55).filled())
        }))?;

        Ok(())
    })
}

/// One rectangle of a treemap, in the coordinates handed to `layout_treemap`
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    pub label: String,
    /// 0 for regions, 1 for categories, 2 for sub-categories
    pub depth: usize,
    pub sales: f64,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

/// Slice-and-dice layout: the top level splits the width, the next level the
/// height, alternating down the tree. Parents come before their children.
pub fn layout_treemap(nodes: &[HierarchyNode], x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Tile> {
    let mut tiles = Vec::new();
    slice(nodes, (x0, y0, x1, y1), 0, &mut tiles);
    tiles
}

fn slice(nodes: &[HierarchyNode], rect: (f64, f64, f64, f64), depth: usize, out: &mut Vec<Tile>) {
    let total: f64 = nodes.iter().map(|n| n.sales.max(0.0)).sum();
    if total <= 0.0 {
        return;
    }

    let (x0, y0, x1, y1) = rect;
    let horizontal = depth % 2 == 0;
    let mut offset = if horizontal { x0 } else { y0 };
    let span = if horizontal { x1 - x0 } else { y1 - y0 };

    for node in nodes {
        let weight = node.sales.max(0.0);
        if weight <= 0.0 {
            continue;
        }
        let extent = span * weight / total;
        let tile = if horizontal {
            (offset, y0, offset + extent, y1)
        } else {
            (x0, offset, x1, offset + extent)
        };
        offset += extent;

        out.push(Tile {
            label: node.name.clone(),
            depth,
            sales: node.sales,
            x0: tile.0,
            y0: tile.1,
            x1: tile.2,
            y1: tile.3,
        });
        slice(&node.children, tile, depth + 1, out);
    }
}

fn color_for(name: &str) -> RGBColor {
    let index = name.bytes().fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    PALETTE[index % PALETTE.len()]
}

/// Treemap of the Region → Category → Sub-Category tree, leaves coloured by name
pub fn treemap_chart(
    tree: &[HierarchyNode],
    options: &GraphOptions,
) -> Result<String, Box<dyn Error>> {
    render_svg(options, |root| {
        if tree.iter().all(|n| n.sales <= 0.0) {
            return draw_no_data(root, options);
        }

        let area = root.titled(&options.title, ("sans-serif", 24))?;
        let (w, h) = area.dim_in_pixel();
        let tiles = layout_treemap(tree, 0.0, 0.0, f64::from(w), f64::from(h));
        let max_depth = tiles.iter().map(|t| t.depth).max().unwrap_or(0);

        for tile in &tiles {
            let corners = [
                (tile.x0 as i32, tile.y0 as i32),
                (tile.x1 as i32, tile.y1 as i32),
            ];
            if tile.depth == max_depth {
                area.draw(&Rectangle::new(corners, color_for(&tile.label).filled()))?;
                if tile.x1 - tile.x0 > 70.0 && tile.y1 - tile.y0 > 30.0 {
                    area.draw(&Text::new(
                        format!("{} {}", tile.label, format_currency(tile.sales)),
                        (tile.x0 as i32 + 4, tile.y0 as i32 + 4),
                        ("sans-serif", 12).into_font().color(&WHITE),
                    ))?;
                }
            }
        }

        // outlines on top so every level stays visible
        for tile in &tiles {
            let corners = [
                (tile.x0 as i32, tile.y0 as i32),
                (tile.x1 as i32, tile.y1 as i32),
            ];
            let stroke = (max_depth + 1 - tile.depth) as u32;
            area.draw(&Rectangle::new(corners, WHITE.stroke_width(stroke)))?;
        }

        Ok(())
    })
}
