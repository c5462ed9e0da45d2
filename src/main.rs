use std::{process::ExitCode, sync::Arc, time::Duration};

use log::Level;
use tokio::sync::watch;
use xhoundpi::{
    client::{CountingClient, TransportClient},
    config::{CliArgs, Config},
    events::{self, AppEvent},
    geo::EulerAngles,
    math,
    metrics::MetricsCollection,
    offset::{
        ConversionOffsetProvider, DistAngleFactorProvider, InverseFactorProvider, OffsetProvider,
        OrientationOffsetProvider, StaticOffsetProvider, StaticOrientationProvider,
    },
    operator::OffsetOperatorProvider,
    policy::{ConstPolicyProvider, HasLocation},
    processor::{
        CompositeProcessor, EventLoggingProcessor, GenericProcessor, MetricsProcessor, Processor,
    },
    runner::GnssPipeline,
    serial::{SerialTransport, StubTransport, Transport},
    service::{EventLoggingGnssService, MetricsGnssService, StandardGnssService},
    GnssError,
};

fn offset_provider(config: &Config) -> Result<Arc<dyn OffsetProvider>, GnssError> {
    let Some(orientation) = config.orientation else {
        log::info!("Using static offset {:?}", config.offset);
        return Ok(Arc::new(StaticOffsetProvider(config.offset)));
    };
    log::info!(
        "Using orientation offset {orientation:?} converted at {:?}",
        config.reference
    );
    let angles = StaticOrientationProvider(EulerAngles {
        yaw: orientation.yaw,
        pitch: orientation.pitch,
        roll: orientation.roll,
    });
    Ok(Arc::new(ConversionOffsetProvider::new(
        OrientationOffsetProvider::new(angles, orientation.radius),
        InverseFactorProvider(DistAngleFactorProvider::new(config.reference)?),
    )))
}

fn processor(
    config: &Config,
    metrics: &mut MetricsCollection,
) -> Result<Arc<dyn Processor>, GnssError> {
    let offset = GenericProcessor::new(
        "CoordinateOffset",
        ConstPolicyProvider::new(HasLocation::new(config.excluded_sentences.iter().cloned())),
        OffsetOperatorProvider::new(offset_provider(config)?),
    );
    let offset = MetricsProcessor::new(EventLoggingProcessor::new(offset), metrics);
    let chain = CompositeProcessor::new("ProcessorChain", vec![Box::new(offset)]);
    Ok(Arc::new(MetricsProcessor::new(chain, metrics)))
}

async fn serve<T: Transport + 'static>(transport: T, config: Config) -> Result<(), GnssError> {
    let mut metrics = MetricsCollection::new();
    let client = CountingClient::new(TransportClient::new(transport), &mut metrics);
    let service = Arc::new(MetricsGnssService::new(
        EventLoggingGnssService::new(StandardGnssService::with_defaults(client)),
        &mut metrics,
    ));
    let processor = processor(&config, &mut metrics)?;
    let pipeline = GnssPipeline::new(service, processor, config.buffer_capacity);

    let (stop, shutdown) = watch::channel(false);
    let stop = Arc::new(stop);
    let reporter = tokio::spawn(events::report_metrics(
        metrics,
        config.metrics_logger_freq,
        shutdown.clone(),
    ));
    let interrupt = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Interrupted, draining pending writes");
                let _ = interrupt.send(true);
            }
            Err(e) => log::error!("Cannot listen for Ctrl-C: {e}"),
        }
    });

    let result = pipeline.run(shutdown).await;
    let _ = stop.send(true);
    if let Err(e) = reporter.await {
        log::warn!("Metrics reporter failed: {e}");
    }
    result
}

async fn run(config: Config) -> Result<(), GnssError> {
    math::set_precision(config.decimal_precision)?;
    if config.mock_gnss {
        let transport = StubTransport::from_files(&config.gnss_mock_input, &config.gnss_mock_output)?;
        serve(transport, config).await
    } else {
        let transport = SerialTransport::open(
            &config.serial_port,
            config.baud_rate,
            Duration::from_millis(config.serial_timeout_ms),
        )?;
        serve(transport, config).await
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli: CliArgs = argh::from_env();
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();
    if cli.save_config {
        match config.store_default() {
            Ok(path) => log::info!("Configuration stored in {path:?}"),
            Err(e) => log::warn!("{e}"),
        }
    }

    events::emit(Level::Info, "AppEvent", &AppEvent::new("xHoundPi starting"));
    log::debug!("Configuration: {config:?}");
    let result = run(config).await;
    events::emit(Level::Info, "AppEvent", &AppEvent::new("xHoundPi stopped"));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
