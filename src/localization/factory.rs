//! Localizer construction
//!
//! The factory is an explicit context built from the map: it caches every
//! edge's walking path, the beacon layout per floor, the edge R-tree, and the
//! per-edge localizer descriptors. It never hands out a half-built
//! localizer; any failure is a `LocalizerConstruction` error.

use super::beacon::{Beacon, BeaconModel};
use super::knn::KnnLocalizer;
use super::model::KnnModel;
use super::particle_1d::ParticleFilter1d;
use super::particle_2d::ParticleFilter2d;
use super::{Localizer, LocalizerDescriptor, LocalizerKind};
use crate::config::NavConfig;
use crate::error::{NavError, Result};
use crate::geometry::EdgePath;
use crate::topo::{EdgeIndex, TopoMap};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-call overrides
#[derive(Clone, Debug, Default)]
pub struct LocalizerOptions {
    pub seed: Option<u64>,
    pub particle_count: Option<usize>,
}

pub struct LocalizerFactory {
    config: NavConfig,
    descriptors: HashMap<String, LocalizerDescriptor>,
    /// Ordered by edge id so floor-wide filters see paths in a stable order
    paths: BTreeMap<String, Arc<EdgePath>>,
    beacons: HashMap<i32, Vec<Beacon>>,
    index: Arc<EdgeIndex>,
    created: AtomicU64,
}

impl LocalizerFactory {
    pub fn new(map: &TopoMap, config: NavConfig) -> Self {
        let mut descriptors = HashMap::new();
        let mut paths = BTreeMap::new();
        for (_, edge) in map.edges().filter(|(_, e)| !e.temporary) {
            paths.insert(edge.id.clone(), Arc::new(edge.path.clone()));
            if let Some(descriptor) = &edge.localizer {
                descriptors.insert(edge.id.clone(), descriptor.clone());
            }
        }
        let mut beacons: HashMap<i32, Vec<Beacon>> = HashMap::new();
        for beacon in map.beacons() {
            beacons.entry(beacon.floor).or_default().push(beacon.clone());
        }
        Self {
            config,
            descriptors,
            paths,
            beacons,
            index: Arc::new(EdgeIndex::from_map(map)),
            created: AtomicU64::new(0),
        }
    }

    /// Bind a localizer descriptor to an edge, replacing any previous one
    pub fn register_descriptor(&mut self, edge_id: impl Into<String>, descriptor: LocalizerDescriptor) {
        self.descriptors.insert(edge_id.into(), descriptor);
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn edge_path(&self, edge_id: &str) -> Option<Arc<EdgePath>> {
        self.paths.get(edge_id).cloned()
    }

    pub fn edge_index(&self) -> &Arc<EdgeIndex> {
        &self.index
    }

    fn beacons_on_floor(&self, floor: i32) -> &[Beacon] {
        self.beacons.get(&floor).map(|b| b.as_slice()).unwrap_or(&[])
    }

    /// Descriptor configured for `edge_id`, or the default 1-D particle filter
    pub fn descriptor_for_edge(&self, edge_id: &str) -> LocalizerDescriptor {
        self.descriptors
            .get(edge_id)
            .cloned()
            .unwrap_or_else(|| LocalizerDescriptor {
                id: format!("pf1d:{}", edge_id),
                kind: LocalizerKind::ParticleFilter1d,
                model: None,
                floor: None,
            })
    }

    pub fn localizer_name_for_edge(&self, edge_id: &str) -> String {
        self.descriptor_for_edge(edge_id).id
    }

    /// (edge id, localizer name) for every edge, sorted by edge id
    pub fn all_edge_localizers(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .paths
            .keys()
            .map(|edge| (edge.clone(), self.localizer_name_for_edge(edge)))
            .collect();
        out.sort();
        out
    }

    pub fn localizer_for_edge(&self, edge_id: &str) -> Result<Localizer> {
        let descriptor = self.descriptor_for_edge(edge_id);
        self.create_with_options(&descriptor, Some(edge_id), &LocalizerOptions::default())
    }

    pub fn localizers_for_edges(&self, edge_ids: &[&str]) -> Result<Vec<Localizer>> {
        edge_ids.iter().map(|e| self.localizer_for_edge(e)).collect()
    }

    /// Build the localizer registered under `id`, bound to `edge_id`
    pub fn localizer_for_id(
        &self,
        id: &str,
        edge_id: Option<&str>,
        options: &LocalizerOptions,
    ) -> Result<Localizer> {
        let descriptor = self
            .descriptors
            .values()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| self.fail(id, "no localizer registered under this id"))?;
        self.create_with_options(&descriptor, edge_id, options)
    }

    pub fn create_localizer(
        &self,
        descriptor: &LocalizerDescriptor,
        edge_id: Option<&str>,
    ) -> Result<Localizer> {
        self.create_with_options(descriptor, edge_id, &LocalizerOptions::default())
    }

    fn create_with_options(
        &self,
        descriptor: &LocalizerDescriptor,
        edge_id: Option<&str>,
        options: &LocalizerOptions,
    ) -> Result<Localizer> {
        let model = descriptor.model.as_deref();
        let localizer = match descriptor.kind {
            LocalizerKind::Knn1d => {
                let edge = self.require_edge(&descriptor.id, edge_id)?;
                let path = model.ok_or_else(|| self.fail(&descriptor.id, "KNN localizer needs a model file"))?;
                self.knn_from_file(&descriptor.id, path, edge)?
            }
            LocalizerKind::ParticleFilter1d => {
                let edge = self.require_edge(&descriptor.id, edge_id)?;
                self.pf_1d(&descriptor.id, model, edge, options)?
            }
            LocalizerKind::ParticleFilter2d => {
                let floor = match (descriptor.floor, edge_id) {
                    (Some(floor), _) => floor,
                    (None, Some(edge)) => self.edge_floor(&descriptor.id, edge)?,
                    (None, None) => return Err(self.fail(&descriptor.id, "2-D filter needs a floor")),
                };
                self.pf_2d(&descriptor.id, model, floor, options)?
            }
        };
        debug!("created localizer {} ({:?})", localizer.name(), localizer.kind());
        Ok(localizer)
    }

    pub fn create_knn_1d_from_file(&self, model: &Path, edge_id: &str) -> Result<Localizer> {
        self.knn_from_file(&format!("knn1d:{}", edge_id), model, edge_id)
    }

    pub fn create_pf_1d_from_file(&self, model: &Path, edge_id: &str) -> Result<Localizer> {
        self.pf_1d(&format!("pf1d:{}", edge_id), Some(model), edge_id, &LocalizerOptions::default())
    }

    pub fn create_pf_2d_from_file(&self, model: &Path, floor: i32) -> Result<Localizer> {
        self.pf_2d(&format!("pf2d:{}", floor), Some(model), floor, &LocalizerOptions::default())
    }

    /// Floor-wide search using the map's beacon layout
    pub fn create_pf_2d_on_floor(&self, floor: i32) -> Result<Localizer> {
        self.pf_2d(&format!("pf2d:{}", floor), None, floor, &LocalizerOptions::default())
    }

    /// Floors that carry both walkable edges and beacons, ascending
    pub fn core_floors(&self) -> Vec<i32> {
        let with_edges: BTreeSet<i32> = self.paths.values().map(|p| p.floor).collect();
        with_edges
            .into_iter()
            .filter(|floor| !self.beacons_on_floor(*floor).is_empty())
            .collect()
    }

    /// One floor-wide search localizer per core floor
    pub fn all_core_localizers(&self) -> Result<Vec<Localizer>> {
        self.core_floors()
            .into_iter()
            .map(|floor| self.create_pf_2d_on_floor(floor))
            .collect()
    }

    /// A localizer of the same kind and settings as `source`, bound to `edge_id`
    pub fn clone_localizer_for_edge(&self, source: &Localizer, edge_id: &str) -> Result<Localizer> {
        match source {
            Localizer::Knn1d(_) => self.localizer_for_edge(edge_id),
            Localizer::ParticleFilter1d(pf) => {
                let name = format!("pf1d:{}", edge_id);
                let path = self.require_path(&name, edge_id)?;
                let beacons = if path.floor == pf.path().floor {
                    pf.beacons()
                } else {
                    self.beacons_on_floor(path.floor).to_vec()
                };
                let filter = ParticleFilter1d::new(
                    name.clone(),
                    path,
                    &beacons,
                    pf.config(),
                    pf.particle_count(),
                    self.rng(&LocalizerOptions::default()),
                )
                .map_err(|reason| self.fail(&name, reason))?;
                Ok(Localizer::ParticleFilter1d(filter))
            }
            Localizer::ParticleFilter2d(_) => self.localizer_for_edge(edge_id),
        }
    }

    fn knn_from_file(&self, name: &str, model_path: &Path, edge_id: &str) -> Result<Localizer> {
        let path = self.require_path(name, edge_id)?;
        let model = KnnModel::load(model_path)
            .map_err(|e| self.fail(name, format!("{}: {}", model_path.display(), e)))?;
        if model.edge_id != edge_id {
            return Err(self.fail(
                name,
                format!("model {} belongs to edge {}", model_path.display(), model.edge_id),
            ));
        }
        let knn = KnnLocalizer::new(name, &model, path, &self.config.knn)
            .map_err(|reason| self.fail(name, reason))?;
        Ok(Localizer::Knn1d(knn))
    }

    fn pf_1d(
        &self,
        name: &str,
        model: Option<&Path>,
        edge_id: &str,
        options: &LocalizerOptions,
    ) -> Result<Localizer> {
        let path = self.require_path(name, edge_id)?;
        let beacons = self.load_beacons(name, model, path.floor)?;
        let count = options.particle_count.unwrap_or(self.config.particles.count_1d);
        let filter = ParticleFilter1d::new(
            name,
            path,
            &beacons,
            &self.config.particles,
            count,
            self.rng(options),
        )
        .map_err(|reason| self.fail(name, reason))?;
        Ok(Localizer::ParticleFilter1d(filter))
    }

    fn pf_2d(
        &self,
        name: &str,
        model: Option<&Path>,
        floor: i32,
        options: &LocalizerOptions,
    ) -> Result<Localizer> {
        let beacons = self.load_beacons(name, model, floor)?;
        let paths: Vec<Arc<EdgePath>> = self
            .paths
            .values()
            .filter(|p| p.floor == floor)
            .cloned()
            .collect();
        let count = options.particle_count.unwrap_or(self.config.particles.count_2d);
        let filter = ParticleFilter2d::new(
            name,
            floor,
            paths,
            self.index.clone(),
            &beacons,
            &self.config.particles,
            count,
            self.rng(options),
        )
        .map_err(|reason| self.fail(name, reason))?;
        Ok(Localizer::ParticleFilter2d(filter))
    }

    fn load_beacons(&self, name: &str, model: Option<&Path>, floor: i32) -> Result<Vec<Beacon>> {
        match model {
            Some(path) => BeaconModel::load(path)
                .map(|m| m.beacons)
                .map_err(|e| self.fail(name, format!("{}: {}", path.display(), e))),
            None => Ok(self.beacons_on_floor(floor).to_vec()),
        }
    }

    /// Fixed seeds advance per localizer so siblings do not share a stream
    fn rng(&self, options: &LocalizerOptions) -> StdRng {
        let n = self.created.fetch_add(1, Ordering::Relaxed);
        match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None if self.config.particles.seed != 0 => {
                StdRng::seed_from_u64(self.config.particles.seed.wrapping_add(n))
            }
            None => StdRng::from_entropy(),
        }
    }

    fn require_edge<'a>(&self, name: &str, edge_id: Option<&'a str>) -> Result<&'a str> {
        edge_id.ok_or_else(|| self.fail(name, "1-D localizer needs an edge"))
    }

    fn require_path(&self, name: &str, edge_id: &str) -> Result<Arc<EdgePath>> {
        self.edge_path(edge_id)
            .ok_or_else(|| self.fail(name, format!("unknown edge {}", edge_id)))
    }

    fn edge_floor(&self, name: &str, edge_id: &str) -> Result<i32> {
        self.require_path(name, edge_id).map(|p| p.floor)
    }

    fn fail(&self, name: &str, reason: impl Into<String>) -> NavError {
        let err = NavError::localizer(name, reason);
        warn!("{}", err);
        err
    }
}
