//! Constructor tag assignment
//!
//! Decides how each constructor of each algebraic type is encoded in a
//! machine word, so the code generator can emit allocation and match
//! code. The target ABI reserves the two low bits of every heap pointer
//! as a primary tag; allocations are word-aligned, so masking the tag
//! off yields a valid pointer.
//!
//! Per type, with constructors split into nullary and non-nullary:
//!
//! - All nullary: the type is a strict enum, encoded as the raw
//!   declaration index with no pointer tag. `False` is 0 and `True` is
//!   1, which the runtime relies on.
//! - Mixed: primary tag 0 is reserved for the nullary constructors,
//!   which encode their index in the word bits above the tag. The
//!   encoding of the first one is bit-identical to the null machine
//!   word, so an empty list and a null pointer are the same value.
//! - Non-nullary constructors take the remaining primary tags in
//!   declaration order. Running out of tags would need a secondary tag
//!   word in the allocation, which is a known limitation.

use crate::core::{Core, CtorId};
use crate::pz::{MAX_PTAG, NUM_PTAG_BITS};
use crate::util::report::{ErrorCollector, Limitation};
use std::collections::BTreeMap;
use tracing::debug;

/// How one constructor is represented at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtorTagInfo {
    /// A strict-enum constant: the raw declaration index, no tag bits
    ConstantNotag { word: u64 },
    /// A nullary constant sharing the type with pointer-carrying
    /// constructors: `ptag | (word_bits << NUM_PTAG_BITS)`
    Constant { ptag: u8, word_bits: u64 },
    /// A heap allocation with this primary tag in the pointer
    TaggedPointer { ptag: u8 },
}

impl CtorTagInfo {
    /// The constant word encoding, for constructors that need no
    /// allocation
    pub fn constant_word(&self) -> Option<u64> {
        match self {
            CtorTagInfo::ConstantNotag { word } => Some(*word),
            CtorTagInfo::Constant { ptag, word_bits } => {
                Some(u64::from(*ptag) | (word_bits << NUM_PTAG_BITS))
            }
            CtorTagInfo::TaggedPointer { .. } => None,
        }
    }
}

/// Tag assignments for every constructor in the module
#[derive(Debug, Default)]
pub struct TagMap {
    map: BTreeMap<CtorId, CtorTagInfo>,
}

impl TagMap {
    pub fn get(&self, ctor: CtorId) -> Option<CtorTagInfo> {
        self.map.get(&ctor).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CtorId, CtorTagInfo)> + '_ {
        self.map.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Assign a tag to every constructor of every type.
pub fn run(core: &Core, errors: &mut ErrorCollector) -> TagMap {
    let mut tags = TagMap::default();

    for type_id in core.type_ids() {
        let def = core.type_def(type_id);
        let nullary: Vec<CtorId> = def
            .ctors
            .iter()
            .copied()
            .filter(|c| core.ctor(*c).is_nullary())
            .collect();
        let with_args: Vec<CtorId> = def
            .ctors
            .iter()
            .copied()
            .filter(|c| !core.ctor(*c).is_nullary())
            .collect();

        if with_args.is_empty() {
            // strict enum
            for (i, ctor) in nullary.iter().enumerate() {
                tags.map
                    .insert(*ctor, CtorTagInfo::ConstantNotag { word: i as u64 });
            }
            continue;
        }

        let mut next_ptag: u64 = 0;
        if !nullary.is_empty() {
            for (i, ctor) in nullary.iter().enumerate() {
                tags.map.insert(
                    *ctor,
                    CtorTagInfo::Constant {
                        ptag: 0,
                        word_bits: i as u64,
                    },
                );
            }
            next_ptag = 1;
        }

        let mut out_of_tags = false;
        for ctor in &with_args {
            if next_ptag > MAX_PTAG {
                out_of_tags = true;
                break;
            }
            tags.map.insert(
                *ctor,
                CtorTagInfo::TaggedPointer {
                    ptag: next_ptag as u8,
                },
            );
            next_ptag += 1;
        }
        if out_of_tags {
            errors.report_limitation(
                def.loc.clone(),
                Limitation::SecondaryTags {
                    type_name: def.name.to_string(),
                    max_tags: (MAX_PTAG + 1) as usize,
                },
            );
        }
        debug!("tags: {} uses {} pointer tags", def.name, next_ptag);
    }

    tags
}
