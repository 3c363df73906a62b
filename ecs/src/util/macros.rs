/// Implement another macro for tuples of types recursively.
#[macro_export]
macro_rules! for_every_tuple {
    ($m:ident !! $head_ty:ident) => {
        $m!($head_ty);
    };
    ($m:ident !! $head_ty:ident, $($tail_ty:ident),*) => (
        $m!($head_ty, $( $tail_ty ),*);
        $crate::for_every_tuple!($m !! $( $tail_ty ),*);
    );
}

/// Apply a macro to all tuple arities from 1 to 16.
///
/// Bundles and queries are implemented for tuples through this macro, so a single `add_entity` or
/// `foreach` call can name at most 16 component types.
#[macro_export]
macro_rules! all_tuples {
    ($m:ident) => {
        $crate::for_every_tuple!($m !! A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P);
    };
}

#[cfg(test)]
mod tests {
    use std::marker::PhantomData;

    struct Arity<Params>(PhantomData<Params>);

    macro_rules! count_arity {
         ($($name: ident),*) => {
            #[allow(dead_code)]
            impl<$($name),*> Arity<($($name,)*)> {
                pub fn arity(&self) -> usize {
                    [$(stringify!($name)),*].len()
                 }
            }
        }
    }

    all_tuples!(count_arity);

    #[test]
    fn smallest_and_largest_arity_are_implemented() {
        // Given
        let single = Arity::<(u8,)>(PhantomData);
        let widest = Arity::<(
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
            u8,
        )>(PhantomData);

        // Then
        assert_eq!(single.arity(), 1);
        assert_eq!(widest.arity(), 16);
    }
}
