use std::{
    io::{Read, Write},
    sync::Arc,
};

use log::{debug, warn};

use crate::{
    archetype::{Archetype, ArchetypeId, Column},
    component::{ComponentId, ComponentSet, MAX_COMPONENTS, Registry},
    error::{Error, Result},
    persist::{Decoder, Encoder},
    storage::{Location, Storage},
};

/// Rows reserved up front when reading an archetype; the rest grow on demand.
const PRE_RESERVE_LIMIT: usize = 4096;

/// Write every non-empty, fully persistable archetype of `storage` to `out`.
///
/// Archetypes holding a component without persistence callbacks are skipped with a warning.
/// `version` is handed unchanged to every component serialiser.
pub fn write<W: Write>(storage: &Storage, out: &mut W, version: u32) -> Result<()> {
    let archetypes: Vec<&Archetype> = storage
        .archetypes()
        .iter()
        .filter(|archetype| {
            if archetype.is_empty() {
                return false;
            }
            if !archetype.layout().is_persistent() {
                warn!(
                    "skipping {} entities of archetype {:?}: not every component is persistable",
                    archetype.len(),
                    archetype.set()
                );
                return false;
            }
            true
        })
        .collect();

    let mut encoder = Encoder::new(out);
    encoder.write_len(archetypes.len())?;
    for archetype in &archetypes {
        write_archetype(archetype, &mut encoder, version)?;
    }

    debug!(
        "wrote {} archetypes with {} entities (version {version})",
        archetypes.len(),
        archetypes.iter().map(|a| a.len()).sum::<usize>()
    );
    Ok(())
}

fn write_archetype(archetype: &Archetype, encoder: &mut Encoder<'_>, version: u32) -> Result<()> {
    let columns = archetype.layout().columns();
    encoder.write_len(archetype.len())?;
    encoder.write_len(columns.len())?;
    for column in columns {
        encoder.write_u8(column.id().raw())?;
    }

    for slot in 0..archetype.len() {
        let row = archetype.row_ptr(slot);
        for column in columns {
            // SAFETY: the slot is live, so the column is initialised at its offset.
            unsafe {
                column
                    .info()
                    .serialize(row.add(column.offset()), encoder, version)?
            };
        }
    }
    Ok(())
}

/// Read a storage written by [`write`].
///
/// Every component id in the stream must be registered with `registry` and persistable. Entities
/// receive fresh ids in stream order. Components are read in the order they were written and
/// placed at the offsets of the current layout, so the stream survives changes to layout
/// planning. On error the partially read storage is dropped.
pub fn read<R: Read>(registry: Arc<Registry>, input: &mut R, version: u32) -> Result<Storage> {
    let mut storage = Storage::new(registry);
    let mut decoder = Decoder::new(input);

    let archetype_count = decoder.read_u64()?;
    for _ in 0..archetype_count {
        read_archetype(&mut storage, &mut decoder, version)?;
    }

    debug!(
        "read {} archetypes with {} entities (version {version})",
        storage.archetype_count(),
        storage.count_entities()
    );
    storage.check();
    Ok(storage)
}

fn read_archetype(storage: &mut Storage, decoder: &mut Decoder<'_>, version: u32) -> Result<()> {
    let entity_count = decoder.read_len()?;
    let component_count = decoder.read_u64()?;
    if component_count == 0 {
        return Err(Error::InvalidStream {
            reason: "archetype without components",
        });
    }
    if component_count > MAX_COMPONENTS as u64 {
        return Err(Error::InvalidStream {
            reason: "archetype with more components than ids exist",
        });
    }

    let mut order = Vec::with_capacity(component_count as usize);
    let mut set = ComponentSet::new();
    for _ in 0..component_count {
        let raw = decoder.read_u8()?;
        let id = ComponentId::new(raw);
        let info = storage
            .registry()
            .try_info(id)
            .map_err(|_| Error::UnknownComponent(raw))?;
        if !info.is_persistent() {
            return Err(Error::NotPersistable(id));
        }
        if !set.insert(id) {
            return Err(Error::DuplicateComponent(id));
        }
        order.push(id);
    }

    let index = storage.find_or_create(&set)?;
    let (archetype, handles) = storage.archetype_and_handles(index);
    // The count is untrusted until the rows are actually read.
    archetype.reserve(entity_count.min(PRE_RESERVE_LIMIT))?;

    // Stream order, resolved against the current layout.
    let columns = order
        .iter()
        .map(|id| archetype.layout().column(*id).copied())
        .collect::<Option<Vec<Column>>>()
        .ok_or(Error::InvalidStream {
            reason: "component missing from its own archetype",
        })?;

    for _ in 0..entity_count {
        archetype.reserve(1)?;
        let slot = archetype.len();
        let row = archetype.row_ptr(slot);
        for (built, column) in columns.iter().enumerate() {
            // SAFETY: the slot is reserved and past the last live row; each column is written
            // once.
            let result = unsafe {
                column
                    .info()
                    .deserialize(row.add(column.offset()), decoder, version)
            };
            if let Err(error) = result {
                for column in &columns[..built] {
                    // SAFETY: these columns were constructed above.
                    unsafe { column.info().destroy(row.add(column.offset())) };
                }
                return Err(error);
            }
        }

        let entity = handles.next();
        // SAFETY: every column of the row was deserialised.
        let slot = unsafe { archetype.commit_row(entity) };
        handles.push(Location::new(ArchetypeId::new(index as u32), slot));
    }
    Ok(())
}
