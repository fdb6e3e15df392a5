use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use tracing::{info, warn};

use crate::geometry::OrientationPolicy;
use crate::optimizer::EngineConfig;
use crate::pallet::PalletSpec;
use crate::report::DEFAULT_MAX_LAYOUT_CELLS;
use crate::scoring::ScoringStrategy;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub optimizer: OptimizerConfig,
    pub catalog: CatalogConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self {
            api: ApiConfig::from_env(),
            optimizer: OptimizerConfig::from_env(),
            catalog: CatalogConfig::from_env(),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "CARTON_FIT_API_HOST";
    const PORT_VAR: &'static str = "CARTON_FIT_API_PORT";

    fn from_env() -> Self {
        let host_value = env_string(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, display_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (Self::DEFAULT_BIND_IP, Self::DEFAULT_HOST.to_string())
            }
        };

        let port = match env_string(Self::PORT_VAR) {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    warn!(
                        "⚠️ {} must not be 0. Using {}.",
                        Self::PORT_VAR,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    warn!(
                        "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                        Self::PORT_VAR,
                        raw,
                        err,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
            },
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_ip: Self::DEFAULT_BIND_IP,
            display_host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
        }
    }
}

/// Engine settings, default scoring, default pallet and layout limit.
#[derive(Clone, Debug)]
pub struct OptimizerConfig {
    engine: EngineConfig,
    scoring: ScoringStrategy,
    pallet: PalletSpec,
    max_layout_cells: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::new(
            EngineConfig::default(),
            ScoringStrategy::default(),
            PalletSpec::default(),
        )
    }
}

impl OptimizerConfig {
    const SCORING_VAR: &'static str = "CARTON_FIT_SCORING";
    const ORIENTATION_VAR: &'static str = "CARTON_FIT_ORIENTATION";
    const WALL_THICKNESS_VAR: &'static str = "CARTON_FIT_DEFAULT_WALL_THICKNESS";
    const GENERAL_EPSILON_VAR: &'static str = "CARTON_FIT_GENERAL_EPSILON";
    const ALTERNATIVES_VAR: &'static str = "CARTON_FIT_ALTERNATIVES";
    const PALLET_LENGTH_VAR: &'static str = "CARTON_FIT_PALLET_LENGTH";
    const PALLET_WIDTH_VAR: &'static str = "CARTON_FIT_PALLET_WIDTH";
    const PALLET_MAX_HEIGHT_VAR: &'static str = "CARTON_FIT_PALLET_MAX_HEIGHT";
    const PALLET_BASE_HEIGHT_VAR: &'static str = "CARTON_FIT_PALLET_BASE_HEIGHT";
    const PALLET_ROTATE_VAR: &'static str = "CARTON_FIT_PALLET_ROTATE_FOOTPRINT";
    const MAX_LAYOUT_CELLS_VAR: &'static str = "CARTON_FIT_MAX_LAYOUT_CELLS";

    pub fn new(engine: EngineConfig, scoring: ScoringStrategy, pallet: PalletSpec) -> Self {
        Self {
            engine,
            scoring,
            pallet,
            max_layout_cells: DEFAULT_MAX_LAYOUT_CELLS,
        }
    }

    pub fn with_max_layout_cells(mut self, max_cells: u64) -> Self {
        self.max_layout_cells = max_cells;
        self
    }

    fn from_env() -> Self {
        let scoring = match env_string(Self::SCORING_VAR) {
            Some(raw) => ScoringStrategy::parse(&raw).unwrap_or_else(|| {
                warn!(
                    "⚠️ Unknown scoring strategy in {} ('{}'). Using {}.",
                    Self::SCORING_VAR,
                    raw,
                    ScoringStrategy::default()
                );
                ScoringStrategy::default()
            }),
            None => ScoringStrategy::default(),
        };

        let orientation_policy = match env_string(Self::ORIENTATION_VAR) {
            Some(raw) => OrientationPolicy::parse(&raw).unwrap_or_else(|| {
                warn!(
                    "⚠️ Unknown orientation policy in {} ('{}'). Using any.",
                    Self::ORIENTATION_VAR,
                    raw
                );
                OrientationPolicy::default()
            }),
            None => OrientationPolicy::default(),
        };

        let default_wall_thickness = load_f64_with_warning(
            Self::WALL_THICKNESS_VAR,
            EngineConfig::DEFAULT_WALL_THICKNESS,
            |value| value >= 0.0,
            "must be zero or positive",
            "Default wall thickness applies to every record without its own",
        );

        let general_epsilon = load_f64_with_warning(
            Self::GENERAL_EPSILON_VAR,
            EngineConfig::DEFAULT_GENERAL_EPSILON,
            |value| value > 0.0 && value < 1.0,
            "must be between 0 and 1 (exclusive)",
            "Warning: Adjusted tolerances may change unit counts at exact fits",
        );

        let alternatives = match env_string(Self::ALTERNATIVES_VAR) {
            Some(raw) => raw.parse::<usize>().unwrap_or_else(|err| {
                warn!(
                    "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                    Self::ALTERNATIVES_VAR,
                    raw,
                    err,
                    EngineConfig::DEFAULT_ALTERNATIVES
                );
                EngineConfig::DEFAULT_ALTERNATIVES
            }),
            None => EngineConfig::DEFAULT_ALTERNATIVES,
        };

        let engine = EngineConfig::builder()
            .general_epsilon(general_epsilon)
            .default_wall_thickness(default_wall_thickness)
            .orientation_policy(orientation_policy)
            .alternatives(alternatives)
            .build()
            .unwrap_or_else(|err| {
                warn!("⚠️ {}. Using default engine settings.", err);
                EngineConfig::default()
            });

        let max_layout_cells = match env_string(Self::MAX_LAYOUT_CELLS_VAR) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(value) if value > 0 => {
                    if value != DEFAULT_MAX_LAYOUT_CELLS {
                        info!(
                            "⚙️ Custom layout cell limit ({} = {}).",
                            Self::MAX_LAYOUT_CELLS_VAR,
                            value
                        );
                    }
                    value
                }
                Ok(_) => {
                    warn!(
                        "⚠️ {} must be greater than 0. Using {}.",
                        Self::MAX_LAYOUT_CELLS_VAR,
                        DEFAULT_MAX_LAYOUT_CELLS
                    );
                    DEFAULT_MAX_LAYOUT_CELLS
                }
                Err(err) => {
                    warn!(
                        "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                        Self::MAX_LAYOUT_CELLS_VAR,
                        raw,
                        err,
                        DEFAULT_MAX_LAYOUT_CELLS
                    );
                    DEFAULT_MAX_LAYOUT_CELLS
                }
            },
            None => DEFAULT_MAX_LAYOUT_CELLS,
        };

        Self {
            engine,
            scoring,
            pallet: Self::pallet_from_env(),
            max_layout_cells,
        }
    }

    fn pallet_from_env() -> PalletSpec {
        let positive = |value: f64| value > 0.0;
        let length = load_f64_with_warning(
            Self::PALLET_LENGTH_VAR,
            PalletSpec::DEFAULT_LENGTH,
            positive,
            "must be greater than 0",
            "Custom pallet length",
        );
        let width = load_f64_with_warning(
            Self::PALLET_WIDTH_VAR,
            PalletSpec::DEFAULT_WIDTH,
            positive,
            "must be greater than 0",
            "Custom pallet width",
        );
        let max_height = load_f64_with_warning(
            Self::PALLET_MAX_HEIGHT_VAR,
            PalletSpec::DEFAULT_MAX_HEIGHT,
            positive,
            "must be greater than 0",
            "Custom pallet height limit",
        );
        let base_height = load_f64_with_warning(
            Self::PALLET_BASE_HEIGHT_VAR,
            PalletSpec::DEFAULT_BASE_HEIGHT,
            |value| value >= 0.0,
            "must be zero or positive",
            "Custom empty pallet height",
        );
        let allow_rotation = env_string(Self::PALLET_ROTATE_VAR)
            .and_then(|raw| parse_bool(&raw, Self::PALLET_ROTATE_VAR))
            .unwrap_or(false);

        if base_height >= max_height {
            warn!(
                "⚠️ Empty pallet height {} is not below the height limit {}; every container will be excluded from pallet plans.",
                base_height, max_height
            );
        }

        PalletSpec {
            length,
            width,
            max_height,
            base_height,
            allow_footprint_rotation: allow_rotation,
        }
    }

    /// Returns the configured engine settings.
    pub fn engine_config(&self) -> EngineConfig {
        self.engine
    }

    /// Scoring used when a request names none.
    pub fn scoring(&self) -> ScoringStrategy {
        self.scoring
    }

    /// Pallet used when a request asks for a pallet plan without dimensions.
    pub fn pallet(&self) -> PalletSpec {
        self.pallet
    }

    /// Largest number of unit cells a layout response may list.
    pub fn max_layout_cells(&self) -> u64 {
        self.max_layout_cells
    }
}

/// Where the editable catalog is read from and persisted to.
#[derive(Clone, Debug, Default)]
pub struct CatalogConfig {
    path: Option<PathBuf>,
}

impl CatalogConfig {
    const PATH_VAR: &'static str = "CARTON_FIT_CATALOG_PATH";

    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    fn from_env() -> Self {
        let path = env_string(Self::PATH_VAR).map(PathBuf::from);
        if let Some(path) = &path {
            info!("🗂️ Catalog file: {}", path.display());
        }
        Self { path }
    }

    /// Catalog file; `None` means the embedded default set, kept in memory only.
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(
                "⚠️ Access to {} failed: {}. Using default value.",
                name, err
            );
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" | "ja" => Some(true),
        "0" | "false" | "no" | "n" | "off" | "nee" => Some(false),
        other => {
            warn!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

fn load_f64_with_warning(
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    notice: &str,
) -> f64 {
    match env_string(var_name) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(value) if value.is_finite() && validator(value) => {
                let tolerance = (default.abs().max(1.0)) * 1e-9;
                if (value - default).abs() > tolerance {
                    info!("⚙️ {} ({} = {}).", notice, var_name, value);
                }
                value
            }
            Ok(_) => {
                warn!(
                    "⚠️ {} contains invalid value '{}': {}. Using {}.",
                    var_name, raw, invalid_hint, default
                );
                default
            }
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}
