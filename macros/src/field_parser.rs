use proc_macro2::Ident;
use syn::spanned::Spanned;
use syn::{Fields, ItemStruct, LitStr, Type};

#[derive(Clone)]
pub struct FieldDef {
    pub name: Ident,
    pub tpe: Type,
}

#[derive(Clone)]
pub struct ColumnDef {
    pub field: FieldDef,
    pub column_name: String,
}

pub struct TransientDef {
    pub field: FieldDef,
}

pub enum ParsingResult {
    Column(ColumnDef),
    Transient(TransientDef),
}

pub struct FieldDefs {
    pub columns: Vec<ColumnDef>,
    pub transients: Vec<TransientDef>,
}

fn parse_model_field(field: &syn::Field) -> Result<ParsingResult, syn::Error> {
    let name = field.ident.clone().ok_or_else(|| syn::Error::new(field.span(), "Unnamed fields not supported"))?;
    let def = FieldDef { name: name.clone(), tpe: field.ty.clone() };
    let mut column_name = name.to_string();
    for attr in &field.attrs {
        if attr.path().is_ident("transient") {
            return Ok(ParsingResult::Transient(TransientDef { field: def }));
        } else if attr.path().is_ident("column") {
            attr.parse_nested_meta(|nested| {
                if nested.path.is_ident("name") {
                    let lit: LitStr = nested.value()?.parse()?;
                    column_name = lit.value();
                    Ok(())
                } else {
                    Err(nested.error("Expected `name = \"...\"` in #[column(...)]"))
                }
            })?;
        }
    }
    if column_name.is_empty() {
        return Err(syn::Error::new(field.span(), "Column name must not be empty"));
    }
    Ok(ParsingResult::Column(ColumnDef { field: def, column_name }))
}

pub fn get_field_defs(ast: &ItemStruct) -> Result<FieldDefs, syn::Error> {
    if !ast.generics.params.is_empty() {
        return Err(syn::Error::new(ast.generics.span(), "`#[derive(Model)]` does not support generic structs."));
    }
    let fields = match &ast.fields {
        Fields::Named(named) => &named.named,
        _ => return Err(syn::Error::new(ast.span(), "`#[derive(Model)]` only supports structs with named fields.")),
    };
    let mut columns: Vec<ColumnDef> = Vec::new();
    let mut transients: Vec<TransientDef> = Vec::new();
    for field in fields.iter() {
        match parse_model_field(field)? {
            ParsingResult::Column(column) => {
                if columns.iter().any(|c| c.column_name == column.column_name) {
                    return Err(syn::Error::new(field.span(), format!("Column '{}' is mapped twice", column.column_name)));
                }
                columns.push(column)
            }
            ParsingResult::Transient(transient) => transients.push(transient),
        }
    }
    if columns.is_empty() {
        return Err(syn::Error::new(ast.span(), "`#[derive(Model)]` needs at least one column field."));
    }
    Ok(FieldDefs { columns, transients })
}
