// Golden Store - fixed input and reference output for one workload instance
// Loaded once before the loop starts, read-only afterwards

use crate::comparator::compare;
use crate::element::{decode_slice, encode_slice, Element};
use crate::error::{ConfigFault, Dataset, HarnessError, Result, StorageError};
use crate::storage::{read_resource, Storage};
use crate::workload::{InputPart, Workload};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Manifest format version
pub const MANIFEST_VERSION: &str = "1.0.0";

/// One resource as recorded in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub elements: usize,
    pub sha256: String,
}

/// Integrity manifest written next to a golden file as `<golden>.meta.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenManifest {
    pub workload: String,
    pub version: String,
    pub input_type: String,
    pub output_type: String,
    pub seed: u64,
    pub inputs: Vec<ManifestEntry>,
    pub golden: ManifestEntry,
    pub created_at: u64,
}

impl GoldenManifest {
    /// Resource name of the manifest belonging to a golden resource
    pub fn resource_name(golden: &str) -> String {
        format!("{}.meta.json", golden)
    }
}

/// Names of the resources a golden set is loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub inputs: Vec<InputPart>,
    pub golden: String,
}

impl ResourceNames {
    /// Default names of a workload
    pub fn for_workload<W: Workload>(workload: &W) -> Self {
        Self {
            inputs: workload.input_parts(),
            golden: workload.golden_resource(),
        }
    }

    /// Replace names, keeping the per-part element counts
    pub fn with_overrides(mut self, inputs: &[String], golden: Option<&str>) -> Result<Self> {
        if !inputs.is_empty() {
            if inputs.len() != self.inputs.len() {
                return Err(HarnessError::InvalidConfig(format!(
                    "workload takes {} input resources, {} configured",
                    self.inputs.len(),
                    inputs.len()
                )));
            }
            for (part, name) in self.inputs.iter_mut().zip(inputs) {
                part.name = name.clone();
            }
        }
        if let Some(golden) = golden {
            self.golden = golden.to_string();
        }
        Ok(self)
    }
}

/// Immutable input dataset and golden output of one workload instance
#[derive(Debug, Clone)]
pub struct GoldenStore<I, O> {
    input: Box<[I]>,
    golden: Box<[O]>,
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn load_exact<S: Storage>(
    storage: &mut S,
    dataset: Dataset,
    name: &str,
    expected: usize,
) -> std::result::Result<Vec<u8>, ConfigFault> {
    let data = read_resource(storage, name, expected).map_err(|e| {
        tracing::error!("Failed to load {} resource {}: {}", dataset, name, e);
        ConfigFault::from_storage(dataset, &e)
    })?;
    if data.len() != expected {
        return Err(ConfigFault::Size {
            dataset,
            expected,
            found: data.len(),
        });
    }
    Ok(data)
}

fn check_entry(entry: &ManifestEntry, name: &str, elements: usize, data: &[u8]) -> std::result::Result<(), ConfigFault> {
    if entry.name != name {
        return Err(ConfigFault::Integrity(format!(
            "manifest lists {} where {} was loaded",
            entry.name, name
        )));
    }
    if entry.elements != elements {
        return Err(ConfigFault::Integrity(format!(
            "{}: manifest says {} elements, workload expects {}",
            name, entry.elements, elements
        )));
    }
    if entry.sha256 != sha256_hex(data) {
        return Err(ConfigFault::Integrity(format!("{}: sha256 mismatch", name)));
    }
    Ok(())
}

impl<I: Element, O: Element> GoldenStore<I, O> {
    /// Build from in-memory datasets
    pub fn from_parts(input: Vec<I>, golden: Vec<O>) -> Self {
        Self {
            input: input.into_boxed_slice(),
            golden: golden.into_boxed_slice(),
        }
    }

    /// Load both datasets through the storage contract.
    ///
    /// Every resource must hold exactly the byte count the workload implies.
    /// When `verify_manifest` is set and a manifest exists next to the golden
    /// resource, element counts and digests must agree with it.
    pub fn load<W, S>(
        workload: &W,
        storage: &mut S,
        names: &ResourceNames,
        verify_manifest: bool,
    ) -> std::result::Result<Self, ConfigFault>
    where
        W: Workload<Input = I, Output = O>,
        S: Storage,
    {
        let manifest = if verify_manifest {
            Self::load_manifest(storage, &names.golden)?
        } else {
            None
        };

        if let Some(manifest) = &manifest {
            if manifest.workload != workload.instance() {
                return Err(ConfigFault::Integrity(format!(
                    "manifest is for {}, running {}",
                    manifest.workload,
                    workload.instance()
                )));
            }
            if manifest.inputs.len() != names.inputs.len() {
                return Err(ConfigFault::Integrity(format!(
                    "manifest lists {} inputs, workload takes {}",
                    manifest.inputs.len(),
                    names.inputs.len()
                )));
            }
        }

        let mut input = Vec::with_capacity(workload.input_len());
        for (n, part) in names.inputs.iter().enumerate() {
            let bytes = load_exact(storage, Dataset::Input, &part.name, part.len * I::BYTES)?;
            if let Some(manifest) = &manifest {
                check_entry(&manifest.inputs[n], &part.name, part.len, &bytes)?;
            }
            input.extend(decode_slice::<I>(&bytes));
        }
        if input.len() != workload.input_len() {
            return Err(ConfigFault::Size {
                dataset: Dataset::Input,
                expected: workload.input_len() * I::BYTES,
                found: input.len() * I::BYTES,
            });
        }

        let bytes = load_exact(storage, Dataset::Golden, &names.golden, workload.output_len() * O::BYTES)?;
        if let Some(manifest) = &manifest {
            check_entry(&manifest.golden, &names.golden, workload.output_len(), &bytes)?;
        }
        let golden = decode_slice::<O>(&bytes);

        tracing::info!(
            "Loaded golden set for {}: {} input elements, {} output elements{}",
            workload.instance(),
            input.len(),
            golden.len(),
            if manifest.is_some() { " (manifest verified)" } else { "" }
        );

        Ok(Self::from_parts(input, golden))
    }

    fn load_manifest<S: Storage>(
        storage: &mut S,
        golden: &str,
    ) -> std::result::Result<Option<GoldenManifest>, ConfigFault> {
        let name = GoldenManifest::resource_name(golden);
        match read_resource(storage, &name, 1 << 20) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ConfigFault::Integrity(format!("unreadable manifest {}: {}", name, e))),
            Err(StorageError::Open { .. }) => {
                tracing::debug!("No manifest {}, skipping integrity check", name);
                Ok(None)
            }
            Err(e) => Err(ConfigFault::from_storage(Dataset::Golden, &e)),
        }
    }

    /// Input dataset
    pub fn input(&self) -> &[I] {
        &self.input
    }

    /// Golden output
    pub fn golden(&self) -> &[O] {
        &self.golden
    }
}

/// Generate a golden set offline and write it under `dir`.
///
/// The input comes from a seeded RNG; the workload runs twice and nothing is
/// written unless both runs agree bit for bit.
pub fn write_golden_set<W: Workload>(
    workload: &W,
    dir: &Path,
    names: &ResourceNames,
    seed: u64,
) -> Result<GoldenManifest> {
    let mut rng = StdRng::seed_from_u64(seed);
    let input = workload.generate_input(&mut rng);
    if input.len() != workload.input_len() {
        return Err(HarnessError::InvalidConfig(format!(
            "{} generated {} input elements, expected {}",
            workload.instance(),
            input.len(),
            workload.input_len()
        )));
    }

    let first = workload.compute(&input);
    let second = workload.compute(&input);
    let rerun = compare(&second, &first)?;
    if !rerun.matched() {
        return Err(HarnessError::NonDeterministic {
            workload: workload.instance(),
            differing: rerun.mismatched_elements(),
        });
    }

    std::fs::create_dir_all(dir)?;

    let mut entries = Vec::with_capacity(names.inputs.len());
    let mut offset = 0;
    for part in &names.inputs {
        let bytes = encode_slice(&input[offset..offset + part.len]);
        offset += part.len;
        std::fs::write(dir.join(&part.name), &bytes)?;
        entries.push(ManifestEntry {
            name: part.name.clone(),
            elements: part.len,
            sha256: sha256_hex(&bytes),
        });
    }

    let golden_bytes = encode_slice(&first);
    std::fs::write(dir.join(&names.golden), &golden_bytes)?;

    let manifest = GoldenManifest {
        workload: workload.instance(),
        version: MANIFEST_VERSION.to_string(),
        input_type: W::Input::TYPE_NAME.to_string(),
        output_type: W::Output::TYPE_NAME.to_string(),
        seed,
        inputs: entries,
        golden: ManifestEntry {
            name: names.golden.clone(),
            elements: first.len(),
            sha256: sha256_hex(&golden_bytes),
        },
        created_at: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    };

    let meta_path = dir.join(GoldenManifest::resource_name(&names.golden));
    std::fs::write(&meta_path, serde_json::to_string_pretty(&manifest)?)?;

    tracing::info!(
        "Wrote golden set for {} to {:?} ({} output elements)",
        workload.instance(),
        dir,
        first.len()
    );

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FsStorage, MemStorage};
    use crate::workloads::identity::Identity;
    use crate::workloads::hotspot::Hotspot;
    use tempfile::TempDir;

    #[test]
    fn test_generate_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let workload = Identity::new(32);
        let names = ResourceNames::for_workload(&workload);
        let manifest = write_golden_set(&workload, temp_dir.path(), &names, 7).unwrap();
        assert_eq!(manifest.golden.elements, 32);

        let mut storage = FsStorage::mount(temp_dir.path()).unwrap();
        let store = GoldenStore::load(&workload, &mut storage, &names, true).unwrap();
        assert_eq!(store.input().len(), 32);
        assert_eq!(store.golden().len(), 32);
        assert!(compare(store.input(), store.golden()).unwrap().matched());
    }

    #[test]
    fn test_multi_part_inputs_concatenate() {
        let temp_dir = TempDir::new().unwrap();
        let workload = Hotspot::new(8, 8, 2);
        let names = ResourceNames::for_workload(&workload);
        assert_eq!(names.inputs.len(), 2);
        write_golden_set(&workload, temp_dir.path(), &names, 1).unwrap();

        let mut storage = FsStorage::mount(temp_dir.path()).unwrap();
        let store = GoldenStore::load(&workload, &mut storage, &names, true).unwrap();
        assert_eq!(store.input().len(), 128);
    }

    #[test]
    fn test_tampered_golden_fails_integrity() {
        let temp_dir = TempDir::new().unwrap();
        let workload = Identity::new(4);
        let names = ResourceNames::for_workload(&workload);
        write_golden_set(&workload, temp_dir.path(), &names, 3).unwrap();

        let path = temp_dir.path().join(&names.golden);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] ^= 1;
        std::fs::write(&path, bytes).unwrap();

        let mut storage = FsStorage::mount(temp_dir.path()).unwrap();
        let err = GoldenStore::load(&workload, &mut storage, &names, true).unwrap_err();
        assert!(matches!(err, ConfigFault::Integrity(_)));

        // Without verification the tampered file loads as-is
        assert!(GoldenStore::load(&workload, &mut storage, &names, false).is_ok());
    }

    #[test]
    fn test_short_golden_is_size_fault() {
        let workload = Identity::new(4);
        let names = ResourceNames::for_workload(&workload);
        let mut storage = MemStorage::new()
            .with(names.inputs[0].name.clone(), encode_slice(&[1.0f64; 4]))
            .with(names.golden.clone(), encode_slice(&[1.0f64; 3]));

        let err = GoldenStore::load(&workload, &mut storage, &names, true).unwrap_err();
        assert_eq!(
            err,
            ConfigFault::Size { dataset: Dataset::Golden, expected: 32, found: 24 }
        );
    }

    #[test]
    fn test_oversized_input_is_size_fault() {
        let workload = Identity::new(4);
        let names = ResourceNames::for_workload(&workload);
        let mut storage = MemStorage::new()
            .with(names.inputs[0].name.clone(), encode_slice(&[1.0f64; 5]))
            .with(names.golden.clone(), encode_slice(&[1.0f64; 4]));

        let err = GoldenStore::load(&workload, &mut storage, &names, false).unwrap_err();
        assert!(matches!(err, ConfigFault::Size { dataset: Dataset::Input, .. }));
    }

    #[test]
    fn test_missing_input_is_open_fault() {
        let workload = Identity::new(4);
        let names = ResourceNames::for_workload(&workload);
        let mut storage = MemStorage::new();
        let err = GoldenStore::load(&workload, &mut storage, &names, false).unwrap_err();
        assert_eq!(err, ConfigFault::Open(Dataset::Input));
    }

    #[test]
    fn test_override_count_must_match() {
        let workload = Hotspot::new(4, 4, 1);
        let names = ResourceNames::for_workload(&workload);
        assert!(names.clone().with_overrides(&["only_one".to_string()], None).is_err());
        let renamed = names
            .with_overrides(&["t.bin".to_string(), "p.bin".to_string()], Some("g.bin"))
            .unwrap();
        assert_eq!(renamed.inputs[1].name, "p.bin");
        assert_eq!(renamed.inputs[1].len, 16);
        assert_eq!(renamed.golden, "g.bin");
    }
}
