//! Conference id -> source lookup, with per-year-range overrides.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use tracing::{Span, debug, instrument};

use super::{
    AuaiSource, CvfSource, JmlrSource, NeuripsSource, OpenReviewSource, PmlrSource, Source,
    SourceError,
};

/// A source that replaces the default one for a range of years.
struct YearOverride {
    conference: String,
    years: RangeInclusive<u16>,
    source: Box<dyn Source>,
}

/// Maps conference ids to sources.
///
/// Lookups are case-insensitive. A year-range override registered with
/// [`SourceRegistry::register_for_years`] wins over the default source.
#[derive(Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Box<dyn Source>>,
    overrides: Vec<YearOverride>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("conferences", &self.conferences())
            .field("overrides", &self.overrides.len())
            .finish()
    }
}

impl SourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `source` as the default for `conference`, replacing any previous one.
    #[instrument(skip(self, source), fields(source_name))]
    pub fn register(&mut self, conference: &str, source: Box<dyn Source>) {
        Span::current().record("source_name", source.name());
        debug!("registering source");
        self.sources.insert(conference.to_ascii_lowercase(), source);
    }

    /// Registers `source` for `conference` in `years` only.
    #[instrument(skip(self, source), fields(source_name))]
    pub fn register_for_years(
        &mut self,
        conference: &str,
        years: RangeInclusive<u16>,
        source: Box<dyn Source>,
    ) {
        Span::current().record("source_name", source.name());
        debug!("registering year-range source");
        self.overrides.push(YearOverride {
            conference: conference.to_ascii_lowercase(),
            years,
            source,
        });
    }

    /// Returns the source that handles `conference` in `year`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::UnknownConference`] listing the registered ids.
    pub fn source_for(&self, conference: &str, year: u16) -> Result<&dyn Source, SourceError> {
        let key = conference.to_ascii_lowercase();
        if let Some(over) = self
            .overrides
            .iter()
            .find(|o| o.conference == key && o.years.contains(&year))
        {
            return Ok(&*over.source);
        }
        self.sources
            .get(&key)
            .map(|source| &**source)
            .ok_or_else(|| SourceError::UnknownConference {
                name: conference.to_string(),
                available: self.conferences().into_iter().map(str::to_string).collect(),
            })
    }

    /// Returns true if any source is registered for `conference`.
    #[must_use]
    pub fn contains(&self, conference: &str) -> bool {
        let key = conference.to_ascii_lowercase();
        self.sources.contains_key(&key) || self.overrides.iter().any(|o| o.conference == key)
    }

    /// Registered conference ids, sorted.
    #[must_use]
    pub fn conferences(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .sources
            .keys()
            .map(String::as_str)
            .chain(self.overrides.iter().map(|o| o.conference.as_str()))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Builds the registry of shipped sources.
#[must_use]
pub fn build_default_source_registry() -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    registry.register("neurips", Box::new(NeuripsSource));
    registry.register("icml", Box::new(PmlrSource::icml()));
    registry.register("colt", Box::new(PmlrSource::colt()));
    registry.register("uai", Box::new(PmlrSource::uai()));
    registry.register_for_years("uai", 2015..=2018, Box::new(AuaiSource::new()));
    registry.register("aistats", Box::new(PmlrSource::aistats()));
    registry.register("cvpr", Box::new(CvfSource::cvpr()));
    registry.register("iccv", Box::new(CvfSource::iccv()));
    registry.register("jmlr", Box::new(JmlrSource));
    registry.register("iclr", Box::new(OpenReviewSource));
    registry
}
