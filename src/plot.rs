//! Diagnostic figures: confusion-matrix heatmap and reliability diagram.
//!
//! Rendered to PNG with plotters' bitmap backend. Writing the file is
//! the only side effect; the drivers decide where (and whether) to save.
use std::path::Path;

use anyhow::{anyhow, Result};
use ndarray::Array2;
use plotters::prelude::*;

use crate::eval::CalibrationBin;

fn draw_err<E: std::fmt::Display>(e: E) -> anyhow::Error {
    anyhow!("rendering figure failed: {e}")
}

/// Render a confusion matrix ([true × predicted]) as an annotated
/// blue heatmap.
pub fn plot_confusion_matrix(
    cm: &Array2<usize>,
    class_names: &[String],
    title: &str,
    path: &Path,
) -> Result<()> {
    let k = cm.nrows();
    let max_count = cm.iter().copied().max().unwrap_or(1).max(1) as f64;

    let root = BitMapBackend::new(path, (640, 560)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..k as f64, 0.0..k as f64)
        .map_err(draw_err)?;

    let names = class_names.to_vec();
    let names_y = names.clone();
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Predicted label")
        .y_desc("True label")
        .x_labels(k)
        .y_labels(k)
        .x_label_formatter(&move |v| {
            let i = *v as usize;
            names.get(i).cloned().unwrap_or_default()
        })
        .y_label_formatter(&move |v| {
            // Row 0 is drawn at the top.
            let i = (k as f64 - 1.0 - *v) as usize;
            names_y.get(i).cloned().unwrap_or_default()
        })
        .draw()
        .map_err(draw_err)?;

    for row in 0..k {
        for col in 0..k {
            let count = cm[[row, col]];
            let shade = (count as f64 / max_count * 200.0) as u8;
            let fill = RGBColor(255 - shade, 255 - shade, 255);
            // Flip rows so true label 0 appears at the top.
            let y0 = (k - 1 - row) as f64;
            let x0 = col as f64;
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [(x0, y0), (x0 + 1.0, y0 + 1.0)],
                    fill.filled(),
                )))
                .map_err(draw_err)?;
            let text_color = if shade > 120 { &WHITE } else { &BLACK };
            chart
                .draw_series(std::iter::once(Text::new(
                    format!("{count}"),
                    (x0 + 0.5, y0 + 0.5),
                    ("sans-serif", 18).into_font().color(text_color),
                )))
                .map_err(draw_err)?;
        }
    }

    root.present().map_err(draw_err)?;
    Ok(())
}

/// Render a reliability diagram: observed accuracy against mean
/// predicted confidence per bin, with the ideal diagonal.
pub fn plot_calibration(bins: &[CalibrationBin], title: &str, path: &Path) -> Result<()> {
    let root = BitMapBackend::new(path, (640, 480)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(45)
        .y_label_area_size(45)
        .build_cartesian_2d(0.0..1.0_f64, 0.0..1.0_f64)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .x_desc("Mean predicted confidence")
        .y_desc("Observed accuracy")
        .draw()
        .map_err(draw_err)?;

    // Ideal calibration.
    chart
        .draw_series(LineSeries::new(
            [(0.0, 0.0), (1.0, 1.0)],
            BLACK.stroke_width(1),
        ))
        .map_err(draw_err)?;

    chart
        .draw_series(LineSeries::new(
            bins.iter().map(|b| (b.mean_confidence, b.accuracy)),
            BLUE.stroke_width(2),
        ))
        .map_err(draw_err)?;
    chart
        .draw_series(
            bins.iter()
                .map(|b| Circle::new((b.mean_confidence, b.accuracy), 4, BLUE.filled())),
        )
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn figures_render_to_files() {
        let dir = tempfile::tempdir().unwrap();

        let cm = array![[10_usize, 2], [3, 9]];
        let names = vec!["left".to_string(), "right".to_string()];
        let cm_path = dir.path().join("confusion.png");
        plot_confusion_matrix(&cm, &names, "Confusion Matrix subject 1", &cm_path).unwrap();
        assert!(cm_path.exists());

        let bins = vec![
            CalibrationBin { mean_confidence: 0.55, accuracy: 0.5, count: 10 },
            CalibrationBin { mean_confidence: 0.95, accuracy: 0.9, count: 10 },
        ];
        let cal_path = dir.path().join("calibration.png");
        plot_calibration(&bins, "Calibration subject 1", &cal_path).unwrap();
        assert!(cal_path.exists());
    }
}
