use super::synthetic::Spectrum;
use plotters::prelude::*;

/// Draws the abundance spectrum (count value against number of hashes) on
/// log-log axes.
pub fn plot_spectrum(path: &str, spectrum: &Spectrum) -> Result<(), Box<dyn std::error::Error>> {
    let points: Vec<(f64, f64)> = spectrum
        .iter()
        .filter(|&(&count, _)| count > 0)
        .map(|(&count, &hashes)| (count as f64, hashes as f64))
        .collect();

    let max_x = points.iter().map(|&(x, _)| x).fold(1.0f64, f64::max);
    let max_y = points.iter().map(|&(_, y)| y).fold(1.0f64, f64::max);

    let root = BitMapBackend::new(path, (1200, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Abundance spectrum", ("sans-serif", 32).into_font())
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(
            (1.0f64..max_x * 1.5).log_scale(),
            (1.0f64..max_y * 1.5).log_scale(),
        )?;

    chart
        .configure_mesh()
        .x_desc("count")
        .y_desc("hashes")
        .label_style(("sans-serif", 18))
        .draw()?;

    let color = RGBColor(31, 119, 180);
    chart.draw_series(LineSeries::new(points.clone(), color.stroke_width(3)))?;
    chart.draw_series(
        points
            .into_iter()
            .map(|point| Circle::new(point, 4, color.filled())),
    )?;

    root.present()?;
    println!("Spectrum saved to {}", path);

    Ok(())
}
