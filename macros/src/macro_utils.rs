use proc_macro::TokenStream;
use proc_macro2::Ident;
use std::env;
use std::fs;
use std::path::PathBuf;

fn expansion_path(dir: &str, file_name: &str) -> Option<PathBuf> {
    let dir_path = env::current_dir().ok()?.join("target").join("macros").join(dir);
    match fs::create_dir_all(&dir_path) {
        Ok(()) => Some(dir_path.join(file_name)),
        Err(e) => {
            eprintln!("Cannot create {:?} for macro output: {}", dir_path, e);
            None
        }
    }
}

/// Dumps the pretty printed expansion under `target/macros/<dir>` and returns the stream unchanged.
pub fn submit_struct_to_stream(stream: proc_macro2::TokenStream, dir: &str, struct_ident: &Ident, suffix: &str) -> TokenStream {
    #[cfg(not(test))]
    {
        if let Some(path) = expansion_path(dir, &format!("{}{}", struct_ident, suffix)) {
            let pretty = match syn::parse2::<syn::File>(stream.clone()) {
                Ok(ast) => prettyplease::unparse(&ast),
                Err(_) => stream.to_string(),
            };
            if let Err(e) = fs::write(&path, pretty) {
                eprintln!("Failed to write macro output to {:?}: {}", path, e);
            }
        }
    }
    stream.into()
}
