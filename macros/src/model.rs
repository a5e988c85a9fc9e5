use crate::field_parser::FieldDefs;
use proc_macro2::{Ident, TokenStream};
use quote::quote;

pub fn new(struct_ident: &Ident, field_defs: &FieldDefs) -> TokenStream {
    let column_fields: Vec<&Ident> = field_defs.columns.iter().map(|c| &c.field.name).collect();
    let column_types: Vec<_> = field_defs.columns.iter().map(|c| &c.field.tpe).collect();
    let column_names: Vec<&String> = field_defs.columns.iter().map(|c| &c.column_name).collect();
    let transient_fields: Vec<&Ident> = field_defs.transients.iter().map(|t| &t.field.name).collect();
    let transient_types: Vec<_> = field_defs.transients.iter().map(|t| &t.field.tpe).collect();

    quote! {
        impl #struct_ident {
            pub const COLUMNS: &'static [&'static str] = &[#(#column_names),*];
        }

        impl ormbit::FromRecord for #struct_ident {
            fn from_record(record: &ormbit::Record) -> ormbit::OrmResult<Self> {
                #( let #column_fields = record.get_as::<#column_types>(#column_names)?; )*
                #( let #transient_fields = <#transient_types>::default(); )*
                Ok(#struct_ident {
                    #( #column_fields, )*
                    #( #transient_fields, )*
                })
            }
        }

        impl ormbit::IntoRow for #struct_ident {
            fn into_row(self) -> ormbit::Row {
                let mut row = ormbit::Row::new();
                #( row.insert(#column_names.to_string(), ormbit::Value::from(self.#column_fields)); )*
                row
            }
        }
    }
}
