extern crate proc_macro;
mod field_parser;
mod macro_utils;
mod model;

use proc_macro::TokenStream;
use proc_macro_error::proc_macro_error;
use syn::{parse_macro_input, ItemStruct};

/// Derives `FromRecord` and `IntoRow` for a struct with named fields.
///
/// Every field maps to the column of the same name unless renamed with `#[column(name = "...")]`.
/// Fields marked `#[transient]` are not read from records (they get `Default::default()`)
/// and are left out of rows.
#[proc_macro_derive(Model, attributes(column, transient))]
#[proc_macro_error]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let item_struct = parse_macro_input!(input as ItemStruct);
    let struct_ident = &item_struct.ident;
    let stream = match field_parser::get_field_defs(&item_struct) {
        Ok(field_defs) => model::new(struct_ident, &field_defs),
        Err(e) => e.to_compile_error(),
    };
    macro_utils::submit_struct_to_stream(stream, "model", struct_ident, "_derive.rs")
}
