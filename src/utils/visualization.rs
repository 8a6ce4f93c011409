//! Plotting of closed-loop runs using gnuplot.

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};

use crate::common::{Point2D, Pose2D};
use crate::simulation::{SimulationTrace, Track};

/// Color palette for consistent styling
pub mod colors {
    pub const BLACK: &str = "#000000";
    pub const RED: &str = "#FF0000";
    pub const GREEN: &str = "#00FF00";
    pub const BLUE: &str = "#0000FF";
    pub const CYAN: &str = "#00FFFF";
    pub const ORANGE: &str = "#FFA500";
    pub const GRAY: &str = "#808080";

    pub const TRACK: &str = GRAY;
    pub const DRIVEN: &str = RED;
    pub const START: &str = GREEN;
    pub const VEHICLE: &str = CYAN;
    pub const STEERING: &str = BLUE;
    pub const THROTTLE: &str = ORANGE;
}

/// Style for line rendering
#[derive(Debug, Clone)]
pub struct PathStyle {
    pub color: String,
    pub line_width: f64,
    pub caption: String,
}

impl PathStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            line_width: 2.0,
            caption: caption.to_string(),
        }
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = width;
        self
    }
}

impl Default for PathStyle {
    fn default() -> Self {
        Self::new(colors::DRIVEN, "Path")
    }
}

/// Style for point rendering
#[derive(Debug, Clone)]
pub struct PointStyle {
    pub color: String,
    pub size: f64,
    pub symbol: char,
    pub caption: String,
}

impl PointStyle {
    pub fn new(color: &str, caption: &str) -> Self {
        Self {
            color: color.to_string(),
            size: 1.0,
            symbol: 'O',
            caption: caption.to_string(),
        }
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn with_symbol(mut self, symbol: char) -> Self {
        self.symbol = symbol;
        self
    }
}

#[derive(Debug, Clone)]
enum Layer {
    Lines { x: Vec<f64>, y: Vec<f64>, style: PathStyle },
    Points { x: Vec<f64>, y: Vec<f64>, style: PointStyle },
}

/// Collects layers and renders them into a single set of axes
pub struct Visualizer {
    layers: Vec<Layer>,
    title: String,
    x_label: String,
    y_label: String,
    x_range: Option<(f64, f64)>,
    y_range: Option<(f64, f64)>,
    aspect_ratio: Option<f64>,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            title: String::new(),
            x_label: "X [m]".to_string(),
            y_label: "Y [m]".to_string(),
            x_range: None,
            y_range: None,
            aspect_ratio: Some(1.0),
        }
    }

    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = title.to_string();
        self
    }

    pub fn set_x_label(&mut self, label: &str) -> &mut Self {
        self.x_label = label.to_string();
        self
    }

    pub fn set_y_label(&mut self, label: &str) -> &mut Self {
        self.y_label = label.to_string();
        self
    }

    pub fn set_x_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.x_range = Some((min, max));
        self
    }

    pub fn set_y_range(&mut self, min: f64, max: f64) -> &mut Self {
        self.y_range = Some((min, max));
        self
    }

    /// Set aspect ratio (None for auto)
    pub fn set_aspect_ratio(&mut self, ratio: Option<f64>) -> &mut Self {
        self.aspect_ratio = ratio;
        self
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Plot a polyline from x,y vectors
    pub fn plot_path_xy(&mut self, x: &[f64], y: &[f64], style: &PathStyle) -> &mut Self {
        self.layers.push(Layer::Lines {
            x: x.to_vec(),
            y: y.to_vec(),
            style: style.clone(),
        });
        self
    }

    /// Plot a polyline through points
    pub fn plot_path(&mut self, points: &[Point2D], style: &PathStyle) -> &mut Self {
        let x: Vec<f64> = points.iter().map(|p| p.x).collect();
        let y: Vec<f64> = points.iter().map(|p| p.y).collect();
        self.plot_path_xy(&x, &y, style)
    }

    pub fn plot_points_xy(&mut self, x: &[f64], y: &[f64], style: &PointStyle) -> &mut Self {
        self.layers.push(Layer::Points {
            x: x.to_vec(),
            y: y.to_vec(),
            style: style.clone(),
        });
        self
    }

    pub fn plot_point(&mut self, point: Point2D, style: &PointStyle) -> &mut Self {
        self.plot_points_xy(&[point.x], &[point.y], style)
    }

    /// Plot vehicle pose with a heading tick
    pub fn plot_vehicle(&mut self, pose: &Pose2D, size: f64) -> &mut Self {
        self.plot_point(pose.position(), &PointStyle::new(colors::VEHICLE, "Vehicle").with_size(size));

        let tick = size * 2.0;
        let end_x = pose.x + tick * pose.yaw.cos();
        let end_y = pose.y + tick * pose.yaw.sin();
        self.plot_path_xy(
            &[pose.x, end_x],
            &[pose.y, end_y],
            &PathStyle::new(colors::VEHICLE, "").with_line_width(2.0),
        )
    }

    fn render(&self) -> Figure {
        let mut figure = Figure::new();
        {
            let axes = figure.axes2d();
            for layer in &self.layers {
                match layer {
                    Layer::Lines { x, y, style } => {
                        axes.lines(
                            x,
                            y,
                            &[
                                Caption(&style.caption),
                                Color(&style.color),
                                LineWidth(style.line_width),
                            ],
                        );
                    }
                    Layer::Points { x, y, style } => {
                        axes.points(
                            x,
                            y,
                            &[
                                Caption(&style.caption),
                                Color(&style.color),
                                PointSymbol(style.symbol),
                                PointSize(style.size),
                            ],
                        );
                    }
                }
            }

            if !self.title.is_empty() {
                axes.set_title(&self.title, &[]);
            }
            axes.set_x_label(&self.x_label, &[]);
            axes.set_y_label(&self.y_label, &[]);

            if let Some((min, max)) = self.x_range {
                axes.set_x_range(AutoOption::Fix(min), AutoOption::Fix(max));
            }
            if let Some((min, max)) = self.y_range {
                axes.set_y_range(AutoOption::Fix(min), AutoOption::Fix(max));
            }
            if let Some(ratio) = self.aspect_ratio {
                axes.set_aspect_ratio(AutoOption::Fix(ratio));
            }
        }
        figure
    }

    /// Render in an interactive gnuplot window
    pub fn show(&self) -> Result<(), String> {
        self.render().show().map_err(|e| e.to_string()).map(|_| ())
    }

    pub fn save_png(&self, path: &str, width: u32, height: u32) -> Result<(), String> {
        self.render().save_to_png(path, width, height).map_err(|e| e.to_string())
    }

    pub fn save_svg(&self, path: &str) -> Result<(), String> {
        self.render().save_to_svg(path, 800, 600).map_err(|e| e.to_string())
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Top-down view of a closed-loop run: track centerline and driven path
pub fn plot_trajectory(track: &Track, trace: &SimulationTrace, title: &str) -> Visualizer {
    let mut vis = Visualizer::new();
    vis.set_title(title);

    let mut centerline = track.points().to_vec();
    if let Some(first) = track.points().first() {
        centerline.push(*first);
    }
    vis.plot_path(&centerline, &PathStyle::new(colors::TRACK, "Track").with_line_width(1.0));
    vis.plot_path_xy(&trace.x, &trace.y, &PathStyle::new(colors::DRIVEN, "Driven"));

    if let Some(first) = track.points().first() {
        vis.plot_point(*first, &PointStyle::new(colors::START, "Start").with_size(1.5));
    }
    if let (Some(&x), Some(&y)) = (trace.x.last(), trace.y.last()) {
        vis.plot_point(Point2D::new(x, y), &PointStyle::new(colors::BLACK, "End").with_size(1.5));
    }
    vis
}

/// Commands and track error over time
pub fn plot_commands(trace: &SimulationTrace) -> Visualizer {
    let mut vis = Visualizer::new();
    vis.set_title("Commands")
        .set_x_label("Time [s]")
        .set_y_label("")
        .set_aspect_ratio(None);
    vis.plot_path_xy(&trace.time, &trace.steering, &PathStyle::new(colors::STEERING, "Steering"));
    vis.plot_path_xy(&trace.time, &trace.throttle, &PathStyle::new(colors::THROTTLE, "Throttle"));
    vis.plot_path_xy(
        &trace.time,
        &trace.track_error,
        &PathStyle::new(colors::RED, "Track error [m]").with_line_width(1.0),
    );
    vis
}
