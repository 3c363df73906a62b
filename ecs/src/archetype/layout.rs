use crate::component::{ComponentId, ComponentSet, Info};

/// A component column placed inside a row.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    info: Info,
    offset: usize,
}

impl Column {
    #[inline]
    pub fn info(&self) -> &Info {
        &self.info
    }

    #[inline]
    pub fn id(&self) -> ComponentId {
        self.info.id()
    }

    /// Byte offset of this component from the start of a row.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// The byte layout of one row of an archetype.
///
/// Rows pack every component of the archetype's set into a single instance of `stride` bytes.
/// Columns are kept in planner order, which is also the order components are written to a
/// persisted stream.
#[derive(Debug, Clone)]
pub struct RowLayout {
    columns: Vec<Column>,
    set: ComponentSet,
    stride: usize,
    align: usize,
    /// Every column has persistence callbacks.
    persistent: bool,
}

/// A half-open range of unused bytes in the row being planned.
#[derive(Debug, Clone, Copy)]
struct FreeBlock {
    start: usize,
    end: usize,
}

impl RowLayout {
    /// Plan the row layout for a set of component descriptors.
    ///
    /// Components are placed largest first (ties broken by larger alignment, then by smaller id),
    /// each into the first free block that can hold it at its alignment. The result depends only
    /// on the descriptors, never on the order they are given in.
    pub fn plan(infos: &[Info]) -> Self {
        let mut sorted = infos.to_vec();
        sorted.sort_by(|a, b| {
            b.size()
                .cmp(&a.size())
                .then(b.align().cmp(&a.align()))
                .then(a.id().cmp(&b.id()))
        });

        let capacity: usize = sorted.iter().map(|i| i.size() + i.align() - 1).sum();
        let mut free = vec![FreeBlock {
            start: 0,
            end: capacity,
        }];

        let mut columns = Vec::with_capacity(sorted.len());
        let mut set = ComponentSet::new();
        let mut align = 1;
        let mut used = 0;
        for info in sorted {
            set.insert(info.id());
            align = align.max(info.align());

            if info.is_zero_sized() {
                columns.push(Column { info, offset: 0 });
                continue;
            }

            let offset = Self::place(&mut free, info.size(), info.align());
            used = used.max(offset + info.size());
            columns.push(Column { info, offset });
        }

        let persistent = columns.iter().all(|c| c.info.is_persistent());
        Self {
            columns,
            set,
            stride: used.next_multiple_of(align),
            align,
            persistent,
        }
    }

    /// First-fit placement into the free list, splitting the chosen block.
    fn place(free: &mut Vec<FreeBlock>, size: usize, align: usize) -> usize {
        let (index, offset) = free
            .iter()
            .enumerate()
            .find_map(|(index, block)| {
                let offset = block.start.next_multiple_of(align);
                (offset + size <= block.end).then_some((index, offset))
            })
            // The initial block reserves alignment slack for every component, so a fit exists.
            .unwrap_or_else(|| unreachable!("row layout free list exhausted"));

        let block = free.remove(index);
        let mut insert_at = index;
        if block.start < offset {
            free.insert(
                insert_at,
                FreeBlock {
                    start: block.start,
                    end: offset,
                },
            );
            insert_at += 1;
        }
        if offset + size < block.end {
            free.insert(
                insert_at,
                FreeBlock {
                    start: offset + size,
                    end: block.end,
                },
            );
        }
        offset
    }

    /// Columns in planner order.
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The set of components this layout holds.
    #[inline]
    pub fn set(&self) -> &ComponentSet {
        &self.set
    }

    /// The size of one row in bytes. Always a multiple of [`align`](Self::align).
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The largest alignment of any component in the row.
    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Get the column for a component id, if present.
    #[inline]
    pub fn column(&self, id: ComponentId) -> Option<&Column> {
        self.columns.iter().find(|c| c.id() == id)
    }

    /// Get the byte offset of a component id, if present.
    #[inline]
    pub fn offset_of(&self, id: ComponentId) -> Option<usize> {
        self.column(id).map(Column::offset)
    }

    /// Determine if every component in the row can be persisted.
    #[inline]
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Determine if every component in the row can be copy constructed.
    pub fn is_cloneable(&self) -> bool {
        self.columns.iter().all(|c| c.info.is_cloneable())
    }
}
