//! These structs provide the CLI interface for the spend-audit CLI.

use crate::aggregate::TimePeriod;
use crate::calendar::FinancialYear;
use crate::detect::DetectorKind;
use crate::error::Error;
use crate::filter::FilterSpec;
use crate::ingest::{IngestOptions, InputFormat};
use crate::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::filter::LevelFilter;

/// spend-audit: find waste, duplicate payments and savings in council spending data.
///
/// Reads transactions in the canonical schema (CSV or JSON with the columns date, supplier,
/// amount, category, unit, council_id and reference) and prints the results as JSON on stdout.
/// Log messages go to stderr.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the anomaly detectors and estimate potential savings.
    ///
    /// Prints findings ordered by severity, the status of each detector, supplier concentration
    /// and a savings summary.
    Analyze(AnalyzeArgs),
    /// Total spending by period and, optionally, by a categorical column.
    Aggregate(AggregateArgs),
    /// Compare what different councils pay the same suppliers.
    Compare(CompareArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// A JSON configuration file overriding detector thresholds and savings rates. Defaults are
    /// used when not given.
    #[arg(long, env = "SPEND_AUDIT_CONFIG")]
    config: Option<DisplayPath>,
}

impl Common {
    pub fn new(log_level: LevelFilter, config: Option<PathBuf>) -> Self {
        Self {
            log_level,
            config: config.map(DisplayPath::from),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn config(&self) -> Option<&Path> {
        self.config.as_ref().map(|p| p.path())
    }
}

/// Where to read transactions from.
#[derive(Debug, Parser, Clone)]
pub struct InputArgs {
    /// A canonical CSV or JSON file.
    #[arg(long = "file", short = 'f')]
    file: DisplayPath,

    /// The file format. Guessed from the file extension when not given.
    #[arg(long)]
    format: Option<InputFormat>,

    /// The council id to use for records that do not have one.
    #[arg(long)]
    council: Option<String>,
}

impl InputArgs {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: DisplayPath::from(file.into()),
            format: None,
            council: None,
        }
    }

    pub fn file(&self) -> &Path {
        self.file.path()
    }

    pub fn format(&self) -> Option<InputFormat> {
        self.format
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            default_council: self.council.clone(),
        }
    }
}

/// Narrow the transactions before analysis.
#[derive(Debug, Default, Parser, Clone)]
pub struct FilterArgs {
    /// Earliest date to include, YYYY-MM-DD.
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Latest date to include, YYYY-MM-DD.
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Smallest amount to include.
    #[arg(long)]
    min_amount: Option<Decimal>,

    /// Largest amount to include.
    #[arg(long)]
    max_amount: Option<Decimal>,

    /// A financial year such as 2024/25. May be repeated.
    #[arg(long = "financial-year")]
    financial_years: Vec<FinancialYear>,

    /// Financial quarter, 1 (April to June) to 4 (January to March).
    #[arg(long)]
    quarter: Option<u8>,

    /// Restrict a column to a value, as column=value. Repeat to select several values of one
    /// column (they are ORed) or several columns (they are ANDed).
    #[arg(long = "facet")]
    facets: Vec<String>,

    /// Case-insensitive text to look for in supplier, category, unit and reference.
    #[arg(long)]
    search: Option<String>,
}

impl FilterArgs {
    /// Converts the arguments into a `FilterSpec`. Column names are not checked here; that
    /// happens when the filter is compiled against a schema.
    pub fn to_filter(&self) -> Result<FilterSpec> {
        let mut filter = FilterSpec::new()
            .date_range(self.from, self.to)
            .amount_range(self.min_amount, self.max_amount);
        for year in &self.financial_years {
            filter = filter.financial_year(*year);
        }
        if let Some(quarter) = self.quarter {
            filter = filter.quarter(quarter);
        }

        let mut facets: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for facet in &self.facets {
            let Some((column, value)) = facet.split_once('=') else {
                return Err(Error::schema(format!(
                    "Facet '{facet}' should look like column=value"
                )));
            };
            facets.entry(column.trim()).or_default().push(value.trim());
        }
        for (column, values) in facets {
            filter = filter.facet(column, values);
        }

        if let Some(search) = &self.search {
            filter = filter.search(search.as_str());
        }
        Ok(filter)
    }
}

/// (Not shown): Args for the `spend-audit analyze` command.
#[derive(Debug, Parser, Clone)]
pub struct AnalyzeArgs {
    #[clap(flatten)]
    input: InputArgs,

    #[clap(flatten)]
    filter: FilterArgs,

    /// Analyse only this council. When not given, every transaction in the file is analysed as
    /// one set.
    #[arg(long)]
    entity: Option<String>,

    /// Run only this detector. May be repeated. All detectors run when not given.
    #[arg(long = "detector")]
    detectors: Vec<DetectorKind>,
}

impl AnalyzeArgs {
    pub fn new(input: InputArgs, filter: FilterArgs) -> Self {
        Self {
            input,
            filter,
            entity: None,
            detectors: Vec::new(),
        }
    }

    pub fn input(&self) -> &InputArgs {
        &self.input
    }

    pub fn filter(&self) -> &FilterArgs {
        &self.filter
    }

    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    pub fn detectors(&self) -> &[DetectorKind] {
        &self.detectors
    }
}

/// (Not shown): Args for the `spend-audit aggregate` command.
#[derive(Debug, Parser, Clone)]
pub struct AggregateArgs {
    #[clap(flatten)]
    input: InputArgs,

    #[clap(flatten)]
    filter: FilterArgs,

    /// The width of each bucket.
    #[arg(long, default_value_t = TimePeriod::Monthly)]
    period: TimePeriod,

    /// A categorical column to split each period by, e.g. category or supplier.
    #[arg(long)]
    group_by: Option<String>,
}

impl AggregateArgs {
    pub fn new(input: InputArgs, filter: FilterArgs, period: TimePeriod) -> Self {
        Self {
            input,
            filter,
            period,
            group_by: None,
        }
    }

    pub fn with_group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by = Some(column.into());
        self
    }

    pub fn input(&self) -> &InputArgs {
        &self.input
    }

    pub fn filter(&self) -> &FilterArgs {
        &self.filter
    }

    pub fn period(&self) -> TimePeriod {
        self.period
    }

    pub fn group_by(&self) -> Option<&str> {
        self.group_by.as_deref()
    }
}

/// (Not shown): Args for the `spend-audit compare` command.
#[derive(Debug, Parser, Clone)]
pub struct CompareArgs {
    #[clap(flatten)]
    input: InputArgs,

    /// A council's population, as council=population. May be repeated. Enables spend per head.
    #[arg(long = "population")]
    populations: Vec<String>,
}

impl CompareArgs {
    pub fn new(input: InputArgs) -> Self {
        Self {
            input,
            populations: Vec::new(),
        }
    }

    pub fn with_population(mut self, council: &str, population: u64) -> Self {
        self.populations.push(format!("{council}={population}"));
        self
    }

    pub fn input(&self) -> &InputArgs {
        &self.input
    }

    /// Parses the `--population` values.
    pub fn populations(&self) -> Result<Vec<(String, u64)>> {
        self.populations
            .iter()
            .map(|p| {
                p.split_once('=')
                    .and_then(|(council, n)| {
                        n.trim().parse().ok().map(|n| (council.trim().to_string(), n))
                    })
                    .ok_or_else(|| {
                        Error::schema(format!("Population '{p}' should look like council=123456"))
                    })
            })
            .collect()
    }
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}
