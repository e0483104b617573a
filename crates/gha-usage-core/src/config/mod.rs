mod settings;

pub use settings::{
    Command, Config, GithubSettings, ScanSettings, Settings, WebSettings, TOKEN_ENV_VAR,
};
