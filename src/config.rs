//! # Channel Configuration
//!
//! Recognized configuration keys and the ODBC connection-string assembly.
//! Unknown keys are rejected at parse time so typos fail the open instead of
//! silently changing behavior.
//!
//! | Key | Values | Default |
//! |-----|--------|---------|
//! | `dsn`, `driver`, `database` | merged into the connection string | - |
//! | `settings.*`, `odbc.settings.*` | extra `K=V` connection pairs | - |
//! | `create-mode` | `no`, `checked`, `always` | `checked` |
//! | `quote-mode` | `sqlite`, `psql`, `sybase`, `none` | `psql` |
//! | `function-mode` | `fields`, `empty` | `fields` |
//! | `default-template` | `none`, `insert`, `function`, `procedure` | `insert` |
//! | `dir` | `r`, `w`, `rw` (bus metadata) | `r` |

use crate::sql::{CreateMode, FunctionMode, QuoteMode, Template};
use eyre::{bail, ensure, Result, WrapErr};

/// Channel direction as seen by the bus. The engine serves inserts and
/// queries on any open channel; this is carried for the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Input,
    Output,
    Both,
}

impl Direction {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "r" => Direction::Input,
            "w" => Direction::Output,
            "rw" => Direction::Both,
            _ => bail!("unknown direction '{}'", s),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    dsn: Option<String>,
    driver: Option<String>,
    database: Option<String>,
    settings: Vec<(String, String)>,
    create_mode: CreateMode,
    quote_mode: QuoteMode,
    function_mode: FunctionMode,
    default_template: Template,
    dir: Direction,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a key/value property set, rejecting unknown keys.
    pub fn from_props<'a, I>(props: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        for (key, value) in props {
            match key {
                "dsn" => config.dsn = Some(value.to_owned()),
                "driver" => config.driver = Some(value.to_owned()),
                "database" => config.database = Some(value.to_owned()),
                "create-mode" => {
                    config.create_mode = CreateMode::parse(value).wrap_err("create-mode")?
                }
                "quote-mode" => {
                    config.quote_mode = QuoteMode::parse(value).wrap_err("quote-mode")?
                }
                "function-mode" => {
                    config.function_mode = FunctionMode::parse(value).wrap_err("function-mode")?
                }
                "default-template" => {
                    config.default_template =
                        Template::parse(value).wrap_err("default-template")?
                }
                "dir" => config.dir = Direction::parse(value).wrap_err("dir")?,
                _ => {
                    let setting = key
                        .strip_prefix("odbc.settings.")
                        .or_else(|| key.strip_prefix("settings."));
                    match setting {
                        Some(name) if !name.is_empty() => {
                            config.settings.push((name.to_owned(), value.to_owned()));
                        }
                        _ => bail!("unknown configuration key '{}'", key),
                    }
                }
            }
        }
        Ok(config)
    }

    pub fn with_dsn(mut self, dsn: impl Into<String>) -> Self {
        self.dsn = Some(dsn.into());
        self
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.push((key.into(), value.into()));
        self
    }

    pub fn with_create_mode(mut self, mode: CreateMode) -> Self {
        self.create_mode = mode;
        self
    }

    pub fn with_quote_mode(mut self, mode: QuoteMode) -> Self {
        self.quote_mode = mode;
        self
    }

    pub fn with_function_mode(mut self, mode: FunctionMode) -> Self {
        self.function_mode = mode;
        self
    }

    pub fn with_default_template(mut self, template: Template) -> Self {
        self.default_template = template;
        self
    }

    pub fn with_dir(mut self, dir: Direction) -> Self {
        self.dir = dir;
        self
    }

    pub fn create_mode(&self) -> CreateMode {
        self.create_mode
    }

    pub fn quote_mode(&self) -> QuoteMode {
        self.quote_mode
    }

    pub fn function_mode(&self) -> FunctionMode {
        self.function_mode
    }

    pub fn default_template(&self) -> Template {
        self.default_template
    }

    pub fn dir(&self) -> Direction {
        self.dir
    }

    /// Assembles the `K=V;...` ODBC connection string.
    pub fn connection_string(&self) -> Result<String> {
        let mut pairs = Vec::with_capacity(self.settings.len() + 3);
        if let Some(dsn) = &self.dsn {
            pairs.push(format!("DSN={}", dsn));
        }
        if let Some(driver) = &self.driver {
            pairs.push(format!("DRIVER={}", driver));
        }
        if let Some(database) = &self.database {
            pairs.push(format!("DATABASE={}", database));
        }
        for (key, value) in &self.settings {
            pairs.push(format!("{}={}", key, value));
        }
        ensure!(
            !pairs.is_empty(),
            "empty connection settings: need dsn, driver, database or settings.*"
        );
        Ok(pairs.join(";"))
    }
}
