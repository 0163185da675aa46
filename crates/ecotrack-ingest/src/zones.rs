use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ecotrack_adapters::{Coordinates, ZoneTarget};
use ecotrack_core::{NewZone, ZoneId, DEFAULT_COUNTRY, PLACEHOLDER_POSTAL_CODE};
use ecotrack_storage::{ReadingStore, StoreError, ZoneLookup};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRegistry {
    pub zones: Vec<ZoneConfig>,
}

/// Static description of a zone to ingest for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// `libelle_region` value used to filter the regional consumption feed.
    #[serde(default)]
    pub region_label: Option<String>,
}

impl ZoneConfig {
    pub fn paris() -> Self {
        Self {
            name: "Paris".to_string(),
            postal_code: Some("75000".to_string()),
            country: None,
            latitude: Some(48.8566),
            longitude: Some(2.3522),
            region_label: Some("Île-de-France".to_string()),
        }
    }

    pub fn new_zone(&self) -> NewZone {
        NewZone {
            name: self.name.clone(),
            postal_code: self
                .postal_code
                .clone()
                .unwrap_or_else(|| PLACEHOLDER_POSTAL_CODE.to_string()),
            country: self
                .country
                .clone()
                .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    pub fn target(&self, zone_id: ZoneId) -> ZoneTarget {
        ZoneTarget {
            zone_id,
            zone_name: self.name.clone(),
            coordinates: self.coordinates(),
            region_label: self.region_label.clone(),
        }
    }
}

impl ZoneRegistry {
    pub fn builtin() -> Self {
        Self {
            zones: vec![ZoneConfig::paris()],
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let registry: Self = serde_yaml::from_str(text).context("parsing zone registry")?;
        registry.validate()?;
        Ok(registry)
    }

    /// Load `path`, falling back to [`ZoneRegistry::builtin`] when it does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        if !fs::try_exists(path)
            .await
            .with_context(|| format!("checking {}", path.display()))?
        {
            info!(path = %path.display(), "zone registry not found; using built-in Paris zone");
            return Ok(Self::builtin());
        }
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.zones.is_empty() {
            bail!("zone registry lists no zones");
        }
        let mut seen = HashSet::new();
        for zone in &self.zones {
            if zone.name.trim().is_empty() {
                bail!("zone registry contains a zone with an empty name");
            }
            if !seen.insert(zone.name.as_str()) {
                bail!("zone {:?} is listed more than once", zone.name);
            }
            if zone.latitude.is_some() != zone.longitude.is_some() {
                bail!("zone {:?} must set both latitude and longitude", zone.name);
            }
        }
        Ok(())
    }
}

/// Maps zone names to stable identifiers, creating zones on first reference.
pub struct ZoneResolver<'a> {
    store: &'a dyn ReadingStore,
}

impl<'a> ZoneResolver<'a> {
    pub fn new(store: &'a dyn ReadingStore) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, zone: &ZoneConfig) -> Result<ZoneLookup, StoreError> {
        let lookup = self.store.get_or_create_zone(&zone.new_zone()).await?;
        if lookup.created {
            info!(zone = %lookup.zone.name, zone_id = %lookup.zone.id, "created zone");
        }
        Ok(lookup)
    }

    pub async fn resolve_or_create(&self, name: &str) -> Result<ZoneId, StoreError> {
        let lookup = self
            .resolve(&ZoneConfig {
                name: name.to_string(),
                postal_code: None,
                country: None,
                latitude: None,
                longitude: None,
                region_label: None,
            })
            .await?;
        Ok(lookup.zone.id)
    }
}
