pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod position_sizing;
pub mod symbols;
pub mod traits;

pub use config::{
    AppConfig, BackgroundTrendConfig, BarConfig, BarKind, BarSourceConfig, BaselineConfig,
    BracketConfig, CombinedConfig, DispatchConfig, EnhancedConfig, ExecutionMode, ExitConfig,
    FeatureConfig, FeatureWeights, MainEngineConfig, RiskConfig, SizingConfig, StrategyConfig,
    SymbolConfig, SyncConfig, TestingMode, TradingWindowConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{BrokerError, ConfigError, StoreError};
pub use events::{
    Bar, BrokerOrder, BrokerPosition, DepthUpdate, FillEvent, MarketEvent, OrderAck,
    OrderRequest, Side, SignalEvent, Tick,
};
pub use position_sizing::calculate_contract_size;
pub use symbols::resolve_front_month;
pub use traits::{
    AccountRecord, AccountStore, BrokerClient, MarketDataSource, PersistedState, SignalFilters,
};
