use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::application::collect::{
    collect_distributions, collect_rebuffer, collect_ssim, CollectOptions, TimeSeriesSource,
};
use crate::application::resolver::ExperimentResolver;
use crate::application::window::TimeWindow;
use crate::config::Settings;
use crate::domain::{build_report, ReportRow, SchemeGrouping};
use crate::error::{Error, Result};
use crate::infrastructure::log_messages::application;
use crate::infrastructure::{CdfPlot, Database, InfluxClient, PlotRenderer, SvgPlotter};

const CDF_BINS: usize = 100;

/// Main application struct that coordinates all components of one run
pub struct Application {
    settings: Settings,
    resolver: ExperimentResolver,
    source: Box<dyn TimeSeriesSource>,
    plotter: Box<dyn PlotRenderer>,
}

impl Application {
    /// Connect to the stores named in `settings`
    ///
    /// With a preloaded experiment file, Postgres is never contacted.
    #[instrument(skip(settings))]
    pub async fn new(settings: Settings, preloaded_experiments: Option<&Path>) -> Result<Self> {
        let resolver = match preloaded_experiments {
            Some(path) => {
                info!(path = %path.display(), "{}", application::USING_PRELOADED_EXPERIMENTS);
                ExperimentResolver::from_preloaded_file(path)?
            }
            None => {
                info!(host = %settings.postgres.host, "{}", application::CONNECTING_TO_DATABASE);
                let database = Database::connect(&settings).await?;
                ExperimentResolver::new(Box::new(database))
            }
        };

        let influx = InfluxClient::new(settings.influx_base_url(), &settings.influxdb);
        info!(url = %influx.base_url(), "{}", application::QUERYING_INFLUXDB);

        Ok(Self::with_parts(
            settings,
            resolver,
            Box::new(influx),
            Box::new(SvgPlotter),
        ))
    }

    pub fn with_parts(
        settings: Settings,
        resolver: ExperimentResolver,
        source: Box<dyn TimeSeriesSource>,
        plotter: Box<dyn PlotRenderer>,
    ) -> Self {
        Self {
            settings,
            resolver,
            source,
            plotter,
        }
    }

    fn options(&self, range: TimeWindow, grouping: SchemeGrouping) -> CollectOptions {
        CollectOptions {
            range,
            window: self.settings.query_window(),
            grouping,
            ordering: self.settings.query.ordering,
        }
    }

    /// Average SSIM against rebuffer rate per `(abr, cc)` scheme, plotted to `output`
    #[instrument(skip(self, range, output), fields(range = %range))]
    pub async fn scatter(&mut self, range: TimeWindow, output: &Path) -> Result<Vec<ReportRow>> {
        let options = self.options(range, SchemeGrouping::AbrAndCongestionControl);

        let ssim = collect_ssim(self.source.as_ref(), &mut self.resolver, &options).await?;
        let rebuffer = collect_rebuffer(self.source.as_ref(), &mut self.resolver, &options).await?;

        let rows = build_report(&ssim, &rebuffer)?;
        self.plotter
            .scatter(&rows, &format!("{range} (UTC)"), output)?;
        Ok(rows)
    }

    /// CDFs of chunk SSIM, SSIM variation and session rebuffer rate per cc
    #[instrument(skip(self, range, output_dir), fields(range = %range))]
    pub async fn cdf(&mut self, range: TimeWindow, output_dir: &Path) -> Result<Vec<PathBuf>> {
        let options = self.options(range, SchemeGrouping::CongestionControl);
        let distributions =
            collect_distributions(self.source.as_ref(), &mut self.resolver, &options).await?;

        let has_values = |series: &std::collections::BTreeMap<_, Vec<f64>>| {
            series.values().any(|values| !values.is_empty())
        };
        if !has_values(&distributions.ssim_db) && !has_values(&distributions.rebuf_rate_percent) {
            return Err(Error::NoData);
        }

        let title = format!("{range} (UTC)");
        let plots = [
            (
                "ssim_cdf.svg",
                CdfPlot {
                    title: title.clone(),
                    x_label: "SSIM (dB)",
                    x_range: Some((0.0, 25.0)),
                    bins: CDF_BINS,
                },
                &distributions.ssim_db,
            ),
            (
                "ssim_var_cdf.svg",
                CdfPlot {
                    title: title.clone(),
                    x_label: "Absolute SSIM variation",
                    x_range: Some((0.0, 4.0)),
                    bins: CDF_BINS,
                },
                &distributions.ssim_variation,
            ),
            (
                "rebuf_rate_cdf.svg",
                CdfPlot {
                    title,
                    x_label: "Rebuffer rate (%)",
                    x_range: None,
                    bins: CDF_BINS,
                },
                &distributions.rebuf_rate_percent,
            ),
        ];

        let mut written = Vec::with_capacity(plots.len());
        for (file_name, plot, series) in plots {
            let path = output_dir.join(file_name);
            self.plotter.cdf(&plot, series, &path)?;
            written.push(path);
        }
        Ok(written)
    }
}
