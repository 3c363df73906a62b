use std::{
    alloc::Layout,
    any::{self, TypeId},
    ptr::{self, NonNull},
};

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    component::{Component, ComponentId},
    error::{Error, Result},
    persist::{Decoder, Encoder},
};

/// Placement copy of the value at `src` into uninitialised memory at `dst`.
type CopyFn = unsafe fn(dst: NonNull<u8>, src: NonNull<u8>);

/// Serialise the value at `src`.
type SerializeFn = unsafe fn(src: NonNull<u8>, encoder: &mut Encoder<'_>, version: u32) -> Result<()>;

/// Deserialise a value into uninitialised memory at `dst`.
type DeserializeFn =
    unsafe fn(dst: NonNull<u8>, decoder: &mut Decoder<'_>, version: u32) -> Result<()>;

/// Type-erased description of a registered component type.
///
/// An `Info` carries everything the archetype store needs to manage values it only knows as raw
/// bytes: the memory layout, and function pointers for each lifecycle operation. All callbacks
/// operate on raw addresses and are `unsafe`; the archetype store is responsible for only passing
/// pointers to properly aligned memory in the documented initialisation state.
///
/// Moves follow Rust semantics: a moved-from location is uninitialised afterwards and must not be
/// destroyed.
#[derive(Debug, Clone, Copy)]
pub struct Info {
    /// The component id.
    id: ComponentId,

    /// Type name, used for diagnostics.
    name: &'static str,

    /// The Rust TypeId for runtime type checking.
    type_id: TypeId,

    /// The memory layout of the component.
    layout: Layout,

    /// The drop function for the component, might be a no-op.
    drop_fn: unsafe fn(NonNull<u8>),

    /// Copy construction. `None` traps when called.
    copy_fn: Option<CopyFn>,

    /// Persistence callbacks. Both are present or both are absent.
    serialize_fn: Option<SerializeFn>,
    deserialize_fn: Option<DeserializeFn>,
}

impl Info {
    /// Construct a descriptor for `C` with destroy and move support only.
    pub fn new<C: Component>() -> Self {
        let drop_fn = if std::mem::needs_drop::<C>() {
            Self::drop_impl::<C>
        } else {
            Self::drop_noop
        };
        Self {
            id: C::ID,
            name: any::type_name::<C>(),
            type_id: TypeId::of::<C>(),
            layout: Layout::new::<C>(),
            drop_fn,
            copy_fn: None,
            serialize_fn: None,
            deserialize_fn: None,
        }
    }

    /// Install a copy-construct callback built from `C`'s [`Clone`] implementation.
    ///
    /// # Panics
    /// Panics if `C` is not the type this descriptor was built for.
    pub fn with_clone<C: Component + Clone>(mut self) -> Self {
        self.assert_type::<C>();
        self.copy_fn = Some(Self::copy_impl::<C>);
        self
    }

    /// Install serialise/deserialise callbacks built from `C`'s serde implementations.
    ///
    /// Loading checks [`Component::accepts_version`] before reading each payload.
    ///
    /// # Panics
    /// Panics if `C` is not the type this descriptor was built for.
    pub fn with_persist<C: Component + Serialize + DeserializeOwned>(mut self) -> Self {
        self.assert_type::<C>();
        self.serialize_fn = Some(Self::serialize_impl::<C>);
        self.deserialize_fn = Some(Self::deserialize_impl::<C>);
        self
    }

    /// Get the component id.
    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Get the Rust type name of the component.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get the Rust TypeId of the component.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Get the memory layout of the component.
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.layout.align()
    }

    /// Determine if this component is zero-sized type.
    #[inline]
    pub fn is_zero_sized(&self) -> bool {
        self.layout.size() == 0
    }

    /// Determine if values of this component can be copy constructed.
    #[inline]
    pub fn is_cloneable(&self) -> bool {
        self.copy_fn.is_some()
    }

    /// Determine if values of this component can be written to and read from a persisted stream.
    #[inline]
    pub fn is_persistent(&self) -> bool {
        self.serialize_fn.is_some() && self.deserialize_fn.is_some()
    }

    /// Destroy the value at `ptr`.
    ///
    /// # Safety
    /// `ptr` must point to an initialised value of this component. It is uninitialised afterwards.
    #[inline]
    pub unsafe fn destroy(&self, ptr: NonNull<u8>) {
        unsafe { (self.drop_fn)(ptr) }
    }

    /// Move the value at `src` into uninitialised memory at `dst`.
    ///
    /// # Safety
    /// `src` must be initialised and `dst` uninitialised; both aligned for this component and not
    /// overlapping. `src` is uninitialised afterwards.
    #[inline]
    pub unsafe fn move_construct(&self, dst: NonNull<u8>, src: NonNull<u8>) {
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), self.layout.size()) }
    }

    /// Destroy the value at `dst`, then move the value at `src` into it.
    ///
    /// # Safety
    /// Both locations must be initialised, aligned for this component and not overlapping. `src` is
    /// uninitialised afterwards.
    #[inline]
    pub unsafe fn move_assign(&self, dst: NonNull<u8>, src: NonNull<u8>) {
        unsafe {
            (self.drop_fn)(dst);
            ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), self.layout.size());
        }
    }

    /// Copy the value at `src` into uninitialised memory at `dst`.
    ///
    /// # Safety
    /// `src` must be initialised and `dst` uninitialised, both aligned for this component.
    ///
    /// # Panics
    /// Panics if the component was registered without a copy callback.
    #[inline]
    pub unsafe fn copy_construct(&self, dst: NonNull<u8>, src: NonNull<u8>) {
        match self.copy_fn {
            Some(copy) => unsafe { copy(dst, src) },
            None => panic!("{}", Error::NotCloneable(self.id)),
        }
    }

    /// Serialise the value at `src`.
    ///
    /// # Safety
    /// `src` must point to an initialised value of this component.
    pub unsafe fn serialize(
        &self,
        src: NonNull<u8>,
        encoder: &mut Encoder<'_>,
        version: u32,
    ) -> Result<()> {
        let serialize = self.serialize_fn.ok_or(Error::NotPersistable(self.id))?;
        unsafe { serialize(src, encoder, version) }
    }

    /// Deserialise a value into `dst`. On error `dst` is left uninitialised.
    ///
    /// # Safety
    /// `dst` must be uninitialised memory aligned for this component.
    pub unsafe fn deserialize(
        &self,
        dst: NonNull<u8>,
        decoder: &mut Decoder<'_>,
        version: u32,
    ) -> Result<()> {
        let deserialize = self.deserialize_fn.ok_or(Error::NotPersistable(self.id))?;
        unsafe { deserialize(dst, decoder, version) }
    }

    #[track_caller]
    fn assert_type<C: 'static>(&self) {
        assert_eq!(
            self.type_id,
            TypeId::of::<C>(),
            "descriptor for `{}` cannot take callbacks from `{}`",
            self.name,
            any::type_name::<C>()
        );
    }

    /// Drop implementation for types that need drop.
    unsafe fn drop_impl<C>(ptr: NonNull<u8>) {
        // SAFETY: Caller ensures ptr points to a valid initialized C
        unsafe {
            ptr::drop_in_place(ptr.as_ptr() as *mut C);
        }
    }

    /// No-op drop for types that don't need drop.
    unsafe fn drop_noop(_ptr: NonNull<u8>) {}

    unsafe fn copy_impl<C: Clone>(dst: NonNull<u8>, src: NonNull<u8>) {
        unsafe {
            let value = (*src.as_ptr().cast::<C>()).clone();
            dst.as_ptr().cast::<C>().write(value);
        }
    }

    unsafe fn serialize_impl<C: Serialize>(
        src: NonNull<u8>,
        encoder: &mut Encoder<'_>,
        _version: u32,
    ) -> Result<()> {
        encoder.write_value(unsafe { &*src.as_ptr().cast::<C>() })
    }

    unsafe fn deserialize_impl<C: Component + DeserializeOwned>(
        dst: NonNull<u8>,
        decoder: &mut Decoder<'_>,
        version: u32,
    ) -> Result<()> {
        if !C::accepts_version(version) {
            return Err(Error::VersionMismatch {
                component: C::ID,
                version,
            });
        }
        let value: C = decoder.read_value()?;
        unsafe { dst.as_ptr().cast::<C>().write(value) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        mem::MaybeUninit,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use serde::Deserialize;

    use super::*;
    use crate::Component;

    #[derive(Component, Clone, Debug, PartialEq)]
    #[component(id = 3, clone)]
    struct Name(String);

    #[derive(Component, Serialize, Deserialize, Debug, PartialEq)]
    #[component(id = 6, persist)]
    struct Score(u32);

    /// Reads only payloads written under version 2.
    #[derive(Serialize, Deserialize)]
    struct Legacy(u16);

    impl Component for Legacy {
        const ID: ComponentId = ComponentId::new(7);

        fn info() -> Info {
            Info::new::<Self>().with_persist::<Self>()
        }

        fn accepts_version(version: u32) -> bool {
            version == 2
        }
    }

    #[derive(Component)]
    #[component(id = 4)]
    struct Marker;

    #[derive(Component)]
    #[component(id = 5)]
    struct DropTracker(Arc<AtomicUsize>);

    impl Drop for DropTracker {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ptr_of<T>(slot: &mut MaybeUninit<T>) -> NonNull<u8> {
        NonNull::new(slot.as_mut_ptr().cast::<u8>()).unwrap()
    }

    #[test]
    fn info_basic_properties() {
        // When
        let info = Name::info();

        // Then
        assert_eq!(info.id(), ComponentId::new(3));
        assert_eq!(info.type_id(), TypeId::of::<Name>());
        assert_eq!(info.layout(), Layout::new::<Name>());
        assert!(info.name().ends_with("Name"));
        assert!(info.is_cloneable());
        assert!(!info.is_persistent());
    }

    #[test]
    fn info_is_zero_sized() {
        // When
        let info = Marker::info();

        // Then
        assert!(info.is_zero_sized());
        assert!(!info.is_cloneable());
    }

    #[test]
    fn copy_construct_leaves_source_intact() {
        // Given
        let info = Name::info();
        let mut src = MaybeUninit::new(Name("ada".into()));
        let mut dst = MaybeUninit::<Name>::uninit();

        // When
        unsafe { info.copy_construct(ptr_of(&mut dst), ptr_of(&mut src)) };

        // Then
        let (src, dst) = unsafe { (src.assume_init(), dst.assume_init()) };
        assert_eq!(src, Name("ada".into()));
        assert_eq!(dst, Name("ada".into()));
    }

    #[test]
    #[should_panic(expected = "component 4 does not support copy construction")]
    fn copy_construct_traps_without_clone() {
        // Given
        let info = Marker::info();
        let mut src = MaybeUninit::new(Marker);
        let mut dst = MaybeUninit::<Marker>::uninit();

        // When
        unsafe { info.copy_construct(ptr_of(&mut dst), ptr_of(&mut src)) };
    }

    #[test]
    fn move_assign_destroys_destination_only() {
        // Given
        let counter = Arc::new(AtomicUsize::new(0));
        let info = DropTracker::info();
        let mut dst = MaybeUninit::new(DropTracker(counter.clone()));
        let mut src = MaybeUninit::new(DropTracker(counter.clone()));

        // When
        unsafe { info.move_assign(ptr_of(&mut dst), ptr_of(&mut src)) };

        // Then - the old destination was dropped, the source was relocated
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        unsafe { info.destroy(ptr_of(&mut dst)) };
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn serialize_without_persist_is_refused() {
        // Given
        let info = Marker::info();
        let mut value = MaybeUninit::new(Marker);
        let mut bytes = Vec::new();
        let mut encoder = Encoder::new(&mut bytes);

        // When
        let result = unsafe { info.serialize(ptr_of(&mut value), &mut encoder, 1) };

        // Then
        assert!(matches!(result, Err(Error::NotPersistable(id)) if id == Marker::ID));
    }

    #[test]
    fn persisted_values_read_back_through_serde() {
        // Given
        let info = Score::info();
        let mut src = MaybeUninit::new(Score(0xbeef));
        let mut dst = MaybeUninit::<Score>::uninit();
        let mut bytes = Vec::new();

        // When
        unsafe { info.serialize(ptr_of(&mut src), &mut Encoder::new(&mut bytes), 1) }.unwrap();
        let mut input = bytes.as_slice();
        unsafe { info.deserialize(ptr_of(&mut dst), &mut Decoder::new(&mut input), 1) }.unwrap();

        // Then
        assert!(info.is_persistent());
        assert_eq!(bytes, vec![0xef, 0xbe, 0, 0]);
        assert_eq!(unsafe { dst.assume_init() }, Score(0xbeef));
    }

    #[test]
    fn refused_version_fails_before_reading() {
        // Given
        let info = Legacy::info();
        let mut dst = MaybeUninit::<Legacy>::uninit();
        let mut input: &[u8] = &[1, 0];

        // When
        let result = unsafe { info.deserialize(ptr_of(&mut dst), &mut Decoder::new(&mut input), 3) };

        // Then
        assert!(matches!(
            result,
            Err(Error::VersionMismatch { component, version: 3 }) if component == Legacy::ID
        ));
        assert_eq!(input.len(), 2);
    }

    #[test]
    #[should_panic(expected = "cannot take callbacks from")]
    fn callbacks_from_another_type_are_rejected() {
        let _ = Marker::info().with_clone::<Name>();
    }
}
