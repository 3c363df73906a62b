mod component;

use proc_macro::TokenStream;

/// Implement `Component` for a struct or enum.
///
/// The id is required: `#[component(id = 7)]`. Add `clone` to install a copy-construct callback
/// from the type's `Clone` impl, and `persist` to install persistence callbacks from its serde
/// `Serialize` and `Deserialize` impls: `#[component(id = 7, clone, persist)]`.
#[proc_macro_derive(Component, attributes(component))]
pub fn derive_component(item: TokenStream) -> TokenStream {
    component::derive_component(item)
}
