use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, LitInt, parse_macro_input};

/// Flags collected from `#[component(...)]`.
#[derive(Default)]
struct Options {
    id: Option<u8>,
    clone: bool,
    persist: bool,
}

pub fn derive_component(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    let mut options = Options::default();
    for attr in ast.attrs.iter().filter(|a| a.path().is_ident("component")) {
        let parsed = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("id") {
                let lit: LitInt = meta.value()?.parse()?;
                options.id = Some(lit.base10_parse()?);
                Ok(())
            } else if meta.path.is_ident("clone") {
                options.clone = true;
                Ok(())
            } else if meta.path.is_ident("persist") {
                options.persist = true;
                Ok(())
            } else {
                Err(meta.error("expected `id = N`, `clone` or `persist`"))
            }
        });
        if let Err(error) = parsed {
            return error.to_compile_error().into();
        }
    }

    let Some(id) = options.id else {
        return syn::Error::new_spanned(
            &ast.ident,
            "components need an id: #[component(id = N)] with N in 0..=255",
        )
        .to_compile_error()
        .into();
    };

    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();
    let with_clone = options
        .clone
        .then(|| quote! { .with_clone::<Self>() });
    let with_persist = options
        .persist
        .then(|| quote! { .with_persist::<Self>() });

    // `::rusty_ecs` resolves inside the crate through `extern crate self as rusty_ecs;`.
    TokenStream::from(quote! {
        impl #impl_generics ::rusty_ecs::component::Component for #name #ty_generics #where_clause {
            const ID: ::rusty_ecs::component::ComponentId =
                ::rusty_ecs::component::ComponentId::new(#id);

            fn info() -> ::rusty_ecs::component::Info {
                ::rusty_ecs::component::Info::new::<Self>()
                    #with_clone
                    #with_persist
            }
        }
    })
}
