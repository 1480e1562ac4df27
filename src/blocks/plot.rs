//=============================================
// sciblock/blocks/plot.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Plot-producing block
// Objective: Run a drawing snippet against the plotting surface and capture
//            the resulting figure as one image
//=============================================

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Fields, seed_namespace};
use crate::capture::{ImageCapture, ImageData, LogDisplay, SurfaceDisplay, SvgCapture};
use crate::config::{Config, DEFAULT_VIRTUAL_ID};
use crate::error::BlockError;
use crate::executor::Executor;
use crate::stdlib_registry::HandleRegistry;
use crate::surface::{PlotSurface, SurfaceLifecycle};

/// Output of a plot block; serialises as `{"image": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotOutput {
    pub image: ImageData,
}

pub struct PlotBlock {
    executor: Executor,
    virtual_id: String,
    surface: PlotSurface,
    lifecycle: SurfaceLifecycle,
    show_plots: bool,
    capture: Box<dyn ImageCapture>,
    display: Box<dyn SurfaceDisplay>,
}

impl Default for PlotBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlotBlock {
    /// Draws into the process-wide surface, clearing it before each run.
    pub fn new() -> Self {
        Self {
            executor: Executor::new(),
            virtual_id: DEFAULT_VIRTUAL_ID.to_string(),
            surface: PlotSurface::global().clone(),
            lifecycle: SurfaceLifecycle::Fresh,
            show_plots: false,
            capture: Box::new(SvgCapture::default()),
            display: Box::new(LogDisplay),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_executor(Executor::new().with_max_call_depth(config.max_call_depth))
            .with_virtual_id(config.virtual_id.clone())
            .with_lifecycle(config.surface_lifecycle)
            .with_show_plots(config.show_plots)
    }

    pub fn with_virtual_id(mut self, virtual_id: impl Into<String>) -> Self {
        self.virtual_id = virtual_id.into();
        self
    }

    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_surface(mut self, surface: PlotSurface) -> Self {
        self.surface = surface;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: SurfaceLifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_show_plots(mut self, show_plots: bool) -> Self {
        self.show_plots = show_plots;
        self
    }

    pub fn with_capture(mut self, capture: impl ImageCapture + 'static) -> Self {
        self.capture = Box::new(capture);
        self
    }

    pub fn with_display(mut self, display: impl SurfaceDisplay + 'static) -> Self {
        self.display = Box::new(display);
        self
    }

    pub fn surface(&self) -> &PlotSurface {
        &self.surface
    }

    pub fn lifecycle(&self) -> SurfaceLifecycle {
        self.lifecycle
    }

    //Function: produce_plot
    //Purpose: Execute a drawing snippet and capture the surface
    //Inputs: prior fields, snippet source
    //Returns: PlotOutput holding exactly one image
    pub fn produce_plot(&self, prior: &Fields, code: &str) -> Result<PlotOutput, BlockError> {
        if self.lifecycle == SurfaceLifecycle::Fresh {
            self.surface.clear();
        }
        let mut namespace = seed_namespace(prior, HandleRegistry::for_plot(&self.surface));
        self.executor.run(&self.virtual_id, code, &mut namespace)?;

        let figure = self.surface.snapshot();
        let image = self.capture.capture(&figure)?;
        if self.show_plots {
            self.display.display(&figure);
        }
        info!(
            virtual_id = %self.virtual_id,
            series = figure.series.len(),
            bytes = image.data.len(),
            "plot block captured image"
        );
        Ok(PlotOutput { image })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDisplay(Arc<AtomicUsize>);

    impl SurfaceDisplay for CountingDisplay {
        fn display(&self, _figure: &crate::surface::Figure) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn block(id: &str) -> PlotBlock {
        PlotBlock::new()
            .with_virtual_id(id)
            .with_surface(PlotSurface::new())
    }

    #[test]
    fn test_from_config_carries_lifecycle() {
        let config = Config {
            surface_lifecycle: SurfaceLifecycle::Accumulate,
            ..Config::default()
        };
        assert_eq!(PlotBlock::from_config(&config).lifecycle(), SurfaceLifecycle::Accumulate);
        assert_eq!(PlotBlock::new().lifecycle(), SurfaceLifecycle::Fresh);
    }

    #[test]
    fn test_plot_produces_one_image() {
        let output = block("<plot_unit_ok>")
            .produce_plot(&Fields::new(), "plt.plot([1, 2, 3], [4, 5, 6])\n")
            .unwrap();
        assert_eq!(output.image.mime_type, "image/svg+xml");
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json.as_object().unwrap().len(), 1);
        assert!(json["image"]["data"].is_string());
    }

    #[test]
    fn test_fresh_lifecycle_clears_between_runs() {
        let plot = block("<plot_unit_fresh>");
        plot.produce_plot(&Fields::new(), "plt.plot([1, 2])\n").unwrap();
        plot.produce_plot(&Fields::new(), "plt.plot([3, 4])\n").unwrap();
        assert_eq!(plot.surface().snapshot().series.len(), 1);
    }

    #[test]
    fn test_accumulate_lifecycle_keeps_series() {
        let plot = block("<plot_unit_accumulate>").with_lifecycle(SurfaceLifecycle::Accumulate);
        plot.produce_plot(&Fields::new(), "plt.plot([1, 2])\n").unwrap();
        plot.produce_plot(&Fields::new(), "plt.plot([3, 4])\n").unwrap();
        assert_eq!(plot.surface().snapshot().series.len(), 2);
    }

    #[test]
    fn test_display_only_when_enabled() {
        let shown = Arc::new(AtomicUsize::new(0));
        let quiet = block("<plot_unit_quiet>").with_display(CountingDisplay(shown.clone()));
        quiet.produce_plot(&Fields::new(), "plt.plot([1])\n").unwrap();
        assert_eq!(shown.load(Ordering::SeqCst), 0);
        let loud = block("<plot_unit_loud>")
            .with_display(CountingDisplay(shown.clone()))
            .with_show_plots(true);
        loud.produce_plot(&Fields::new(), "plt.plot([1])\n").unwrap();
        assert_eq!(shown.load(Ordering::SeqCst), 1);
    }
}
