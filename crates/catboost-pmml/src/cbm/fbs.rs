//! FlatBuffers accessors for the `NCatBoostFbs` model schema.
//!
//! Only the tables and fields the converter reads are declared here. Slot
//! offsets follow the schema field order (`4 + 2 * field_id`), so tables
//! written by newer CatBoost versions with extra trailing fields remain
//! readable.
//!
//! All accessors assume the buffer has passed [`flatbuffers::root`]
//! verification, which every entry point in this crate performs.

use flatbuffers::{Follow, ForwardsUOffset, Table, VOffsetT, Vector, Verifiable, Verifier};

/// Vtable slot offset for a schema field id.
const fn slot(field_id: VOffsetT) -> VOffsetT {
    4 + 2 * field_id
}

/// Verify and open a model table segment.
pub fn root_as_model_core(buf: &[u8]) -> Result<TModelCore<'_>, flatbuffers::InvalidFlatbuffer> {
    flatbuffers::root::<TModelCore>(buf)
}

// ============================================================================
// TModelCore
// ============================================================================

/// Root table of a CatBoost model.
#[derive(Clone, Copy, PartialEq)]
pub struct TModelCore<'a> {
    table: Table<'a>,
}

impl<'a> Follow<'a> for TModelCore<'a> {
    type Inner = TModelCore<'a>;

    #[inline]
    unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
        Self {
            table: unsafe { Table::new(buf, loc) },
        }
    }
}

impl<'a> TModelCore<'a> {
    pub const VT_FORMAT_VERSION: VOffsetT = slot(0);
    pub const VT_MODEL_TREES: VOffsetT = slot(1);
    pub const VT_INFO_MAP: VOffsetT = slot(2);
    pub const VT_MODEL_PART_IDS: VOffsetT = slot(3);

    pub fn format_version(&self) -> Option<&'a str> {
        // SAFETY: verified as ForwardsUOffset<&str> in `run_verifier`.
        unsafe {
            self.table
                .get::<ForwardsUOffset<&str>>(Self::VT_FORMAT_VERSION, None)
        }
    }

    /// Tree tables (`ObliviousTrees` in older schema revisions).
    pub fn model_trees(&self) -> Option<TModelTrees<'a>> {
        // SAFETY: verified as ForwardsUOffset<TModelTrees> in `run_verifier`.
        unsafe {
            self.table
                .get::<ForwardsUOffset<TModelTrees>>(Self::VT_MODEL_TREES, None)
        }
    }

    pub fn info_map(&self) -> Option<Vector<'a, ForwardsUOffset<TKeyValue<'a>>>> {
        // SAFETY: verified as a vector of TKeyValue tables in `run_verifier`.
        unsafe {
            self.table
                .get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<TKeyValue>>>>(
                    Self::VT_INFO_MAP,
                    None,
                )
        }
    }

    pub fn model_part_ids(&self) -> Option<Vector<'a, ForwardsUOffset<&'a str>>> {
        // SAFETY: verified as a vector of strings in `run_verifier`.
        unsafe {
            self.table
                .get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<&str>>>>(
                    Self::VT_MODEL_PART_IDS,
                    None,
                )
        }
    }
}

impl Verifiable for TModelCore<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), flatbuffers::InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<&str>>("FormatVersion", Self::VT_FORMAT_VERSION, false)?
            .visit_field::<ForwardsUOffset<TModelTrees>>("ModelTrees", Self::VT_MODEL_TREES, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<TKeyValue>>>>(
                "InfoMap",
                Self::VT_INFO_MAP,
                false,
            )?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<&str>>>>(
                "ModelPartIds",
                Self::VT_MODEL_PART_IDS,
                false,
            )?
            .finish();
        Ok(())
    }
}

// ============================================================================
// TKeyValue
// ============================================================================

/// Entry of the model's string metadata map.
#[derive(Clone, Copy, PartialEq)]
pub struct TKeyValue<'a> {
    table: Table<'a>,
}

impl<'a> Follow<'a> for TKeyValue<'a> {
    type Inner = TKeyValue<'a>;

    #[inline]
    unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
        Self {
            table: unsafe { Table::new(buf, loc) },
        }
    }
}

impl<'a> TKeyValue<'a> {
    pub const VT_KEY: VOffsetT = slot(0);
    pub const VT_VALUE: VOffsetT = slot(1);

    pub fn key(&self) -> &'a str {
        // SAFETY: verified as a required string in `run_verifier`.
        unsafe {
            self.table
                .get::<ForwardsUOffset<&str>>(Self::VT_KEY, None)
                .unwrap_or_default()
        }
    }

    pub fn value(&self) -> &'a str {
        // SAFETY: verified as a required string in `run_verifier`.
        unsafe {
            self.table
                .get::<ForwardsUOffset<&str>>(Self::VT_VALUE, None)
                .unwrap_or_default()
        }
    }
}

impl Verifiable for TKeyValue<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), flatbuffers::InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<&str>>("Key", Self::VT_KEY, true)?
            .visit_field::<ForwardsUOffset<&str>>("Value", Self::VT_VALUE, true)?
            .finish();
        Ok(())
    }
}

// ============================================================================
// TModelTrees
// ============================================================================

/// Oblivious tree tables and feature descriptors.
///
/// Vectors of unsupported feature tables are verified as plain tables: only
/// their lengths are ever inspected.
#[derive(Clone, Copy, PartialEq)]
pub struct TModelTrees<'a> {
    table: Table<'a>,
}

impl<'a> Follow<'a> for TModelTrees<'a> {
    type Inner = TModelTrees<'a>;

    #[inline]
    unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
        Self {
            table: unsafe { Table::new(buf, loc) },
        }
    }
}

/// Table whose fields are never read; only its presence is verified.
#[derive(Clone, Copy, PartialEq)]
pub struct OpaqueTable<'a> {
    _table: Table<'a>,
}

impl<'a> Follow<'a> for OpaqueTable<'a> {
    type Inner = OpaqueTable<'a>;

    #[inline]
    unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
        Self {
            _table: unsafe { Table::new(buf, loc) },
        }
    }
}

impl Verifiable for OpaqueTable<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), flatbuffers::InvalidFlatbuffer> {
        v.visit_table(pos)?.finish();
        Ok(())
    }
}

/// Vector of tables whose contents are never read.
pub type OpaqueTables<'a> = Vector<'a, ForwardsUOffset<OpaqueTable<'a>>>;

impl<'a> TModelTrees<'a> {
    pub const VT_APPROX_DIMENSION: VOffsetT = slot(0);
    pub const VT_TREE_SPLITS: VOffsetT = slot(1);
    pub const VT_TREE_SIZES: VOffsetT = slot(2);
    pub const VT_TREE_START_OFFSETS: VOffsetT = slot(3);
    pub const VT_CAT_FEATURES: VOffsetT = slot(4);
    pub const VT_FLOAT_FEATURES: VOffsetT = slot(5);
    pub const VT_ONE_HOT_FEATURES: VOffsetT = slot(6);
    pub const VT_CTR_FEATURES: VOffsetT = slot(7);
    pub const VT_LEAF_VALUES: VOffsetT = slot(8);
    pub const VT_LEAF_WEIGHTS: VOffsetT = slot(9);
    pub const VT_NON_SYMMETRIC_STEP_NODES: VOffsetT = slot(10);
    pub const VT_NON_SYMMETRIC_NODE_ID_TO_LEAF_ID: VOffsetT = slot(11);
    pub const VT_TEXT_FEATURES: VOffsetT = slot(12);
    pub const VT_ESTIMATED_FEATURES: VOffsetT = slot(13);
    pub const VT_SCALE: VOffsetT = slot(14);
    pub const VT_BIAS: VOffsetT = slot(15);
    pub const VT_MULTI_BIAS: VOffsetT = slot(16);
    pub const VT_EMBEDDING_FEATURES: VOffsetT = slot(18);

    pub fn approx_dimension(&self) -> i32 {
        // SAFETY: verified as i32 in `run_verifier`.
        unsafe { self.table.get::<i32>(Self::VT_APPROX_DIMENSION, Some(0)) }.unwrap_or(0)
    }

    pub fn tree_splits(&self) -> Option<Vector<'a, i32>> {
        // SAFETY: verified in `run_verifier`.
        unsafe { self.table.get::<ForwardsUOffset<Vector<'a, i32>>>(Self::VT_TREE_SPLITS, None) }
    }

    pub fn tree_sizes(&self) -> Option<Vector<'a, i32>> {
        // SAFETY: verified in `run_verifier`.
        unsafe { self.table.get::<ForwardsUOffset<Vector<'a, i32>>>(Self::VT_TREE_SIZES, None) }
    }

    pub fn float_features(&self) -> Option<Vector<'a, ForwardsUOffset<TFloatFeature<'a>>>> {
        // SAFETY: verified in `run_verifier`.
        unsafe {
            self.table
                .get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<TFloatFeature>>>>(
                    Self::VT_FLOAT_FEATURES,
                    None,
                )
        }
    }

    pub fn leaf_values(&self) -> Option<Vector<'a, f64>> {
        // SAFETY: verified in `run_verifier`.
        unsafe { self.table.get::<ForwardsUOffset<Vector<'a, f64>>>(Self::VT_LEAF_VALUES, None) }
    }

    pub fn leaf_weights(&self) -> Option<Vector<'a, f64>> {
        // SAFETY: verified in `run_verifier`.
        unsafe { self.table.get::<ForwardsUOffset<Vector<'a, f64>>>(Self::VT_LEAF_WEIGHTS, None) }
    }

    pub fn scale(&self) -> f64 {
        // SAFETY: verified as f64 in `run_verifier`.
        unsafe { self.table.get::<f64>(Self::VT_SCALE, Some(1.0)) }.unwrap_or(1.0)
    }

    pub fn bias(&self) -> f64 {
        // SAFETY: verified as f64 in `run_verifier`.
        unsafe { self.table.get::<f64>(Self::VT_BIAS, Some(0.0)) }.unwrap_or(0.0)
    }

    pub fn multi_bias(&self) -> Option<Vector<'a, f64>> {
        // SAFETY: verified in `run_verifier`.
        unsafe { self.table.get::<ForwardsUOffset<Vector<'a, f64>>>(Self::VT_MULTI_BIAS, None) }
    }

    /// Number of entries in an unsupported feature vector (0 when absent).
    pub fn opaque_len(&self, slot: VOffsetT) -> usize {
        // SAFETY: every slot passed here is verified as a vector of tables.
        unsafe { self.table.get::<ForwardsUOffset<OpaqueTables<'a>>>(slot, None) }
            .map_or(0, |v| v.len())
    }

    /// Number of entries in the non-symmetric step node vector (0 when absent).
    pub fn non_symmetric_step_nodes_len(&self) -> usize {
        // SAFETY: verified as a vector of 4-byte structs in `run_verifier`.
        unsafe {
            self.table
                .get::<ForwardsUOffset<Vector<'a, u32>>>(Self::VT_NON_SYMMETRIC_STEP_NODES, None)
        }
        .map_or(0, |v| v.len())
    }
}

impl Verifiable for TModelTrees<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), flatbuffers::InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<i32>("ApproxDimension", Self::VT_APPROX_DIMENSION, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("TreeSplits", Self::VT_TREE_SPLITS, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("TreeSizes", Self::VT_TREE_SIZES, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>(
                "TreeStartOffsets",
                Self::VT_TREE_START_OFFSETS,
                false,
            )?
            .visit_field::<ForwardsUOffset<OpaqueTables>>("CatFeatures", Self::VT_CAT_FEATURES, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<TFloatFeature>>>>(
                "FloatFeatures",
                Self::VT_FLOAT_FEATURES,
                false,
            )?
            .visit_field::<ForwardsUOffset<OpaqueTables>>(
                "OneHotFeatures",
                Self::VT_ONE_HOT_FEATURES,
                false,
            )?
            .visit_field::<ForwardsUOffset<OpaqueTables>>("CtrFeatures", Self::VT_CTR_FEATURES, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, f64>>>("LeafValues", Self::VT_LEAF_VALUES, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, f64>>>("LeafWeights", Self::VT_LEAF_WEIGHTS, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, u32>>>(
                "NonSymmetricStepNodes",
                Self::VT_NON_SYMMETRIC_STEP_NODES,
                false,
            )?
            .visit_field::<ForwardsUOffset<Vector<'_, u32>>>(
                "NonSymmetricNodeIdToLeafId",
                Self::VT_NON_SYMMETRIC_NODE_ID_TO_LEAF_ID,
                false,
            )?
            .visit_field::<ForwardsUOffset<OpaqueTables>>("TextFeatures", Self::VT_TEXT_FEATURES, false)?
            .visit_field::<ForwardsUOffset<OpaqueTables>>(
                "EstimatedFeatures",
                Self::VT_ESTIMATED_FEATURES,
                false,
            )?
            .visit_field::<f64>("Scale", Self::VT_SCALE, false)?
            .visit_field::<f64>("Bias", Self::VT_BIAS, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, f64>>>("MultiBias", Self::VT_MULTI_BIAS, false)?
            .visit_field::<ForwardsUOffset<OpaqueTables>>(
                "EmbeddingFeatures",
                Self::VT_EMBEDDING_FEATURES,
                false,
            )?
            .finish();
        Ok(())
    }
}

// ============================================================================
// TFloatFeature
// ============================================================================

/// Float feature descriptor: placement index, name, split borders and NaN routing.
#[derive(Clone, Copy, PartialEq)]
pub struct TFloatFeature<'a> {
    table: Table<'a>,
}

impl<'a> Follow<'a> for TFloatFeature<'a> {
    type Inner = TFloatFeature<'a>;

    #[inline]
    unsafe fn follow(buf: &'a [u8], loc: usize) -> Self::Inner {
        Self {
            table: unsafe { Table::new(buf, loc) },
        }
    }
}

impl<'a> TFloatFeature<'a> {
    pub const VT_HAS_NANS: VOffsetT = slot(0);
    pub const VT_INDEX: VOffsetT = slot(1);
    pub const VT_FLAT_INDEX: VOffsetT = slot(2);
    pub const VT_BORDERS: VOffsetT = slot(3);
    pub const VT_FEATURE_ID: VOffsetT = slot(4);
    pub const VT_NAN_VALUE_TREATMENT: VOffsetT = slot(5);

    pub fn index(&self) -> i32 {
        // SAFETY: verified as i32 in `run_verifier`.
        unsafe { self.table.get::<i32>(Self::VT_INDEX, Some(-1)) }.unwrap_or(-1)
    }

    /// Raw `ENanValueTreatment` byte (`AsIs = 0`, `AsFalse = 1`, `AsTrue = 2`).
    pub fn nan_value_treatment(&self) -> i8 {
        // SAFETY: verified as i8 in `run_verifier`.
        unsafe { self.table.get::<i8>(Self::VT_NAN_VALUE_TREATMENT, Some(0)) }.unwrap_or(0)
    }

    pub fn borders(&self) -> Option<Vector<'a, f32>> {
        // SAFETY: verified in `run_verifier`.
        unsafe { self.table.get::<ForwardsUOffset<Vector<'a, f32>>>(Self::VT_BORDERS, None) }
    }

    pub fn feature_id(&self) -> Option<&'a str> {
        // SAFETY: verified in `run_verifier`.
        unsafe { self.table.get::<ForwardsUOffset<&str>>(Self::VT_FEATURE_ID, None) }
    }
}

impl Verifiable for TFloatFeature<'_> {
    #[inline]
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), flatbuffers::InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<bool>("HasNans", Self::VT_HAS_NANS, false)?
            .visit_field::<i32>("Index", Self::VT_INDEX, false)?
            .visit_field::<i32>("FlatIndex", Self::VT_FLAT_INDEX, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, f32>>>("Borders", Self::VT_BORDERS, false)?
            .visit_field::<ForwardsUOffset<&str>>("FeatureId", Self::VT_FEATURE_ID, false)?
            .visit_field::<i8>("NanValueTreatment", Self::VT_NAN_VALUE_TREATMENT, false)?
            .finish();
        Ok(())
    }
}
