use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use std::collections::HashSet;
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::{
    parse_macro_input, parse_quote, Attribute, Data, DeriveInput, Expr, ExprLit, Fields, FnArg,
    Generics, ImplItem, ItemImpl, Lit, LitStr, Meta, ReturnType, Signature, Token, Type,
    TypeParamBound, Visibility,
};

/// Declare a contract from a shape struct. Fields become get-only properties unless marked.
///
/// Usage:
/// #[derive(Contract)]
/// #[duck(
///   rename_all = "PascalCase",
///   extends(Named),
///   method(fn greet(&self, name: String) -> String)
/// )]
/// struct Greeter {
///   #[duck(set)] id: Uuid,
///   #[duck(rename = "Tag", write_only)] label: String,
/// }
///
/// `indexer(K, V)` and `event = ".."` may also be declared; such contracts are rejected at
/// introspection time.
#[proc_macro_derive(Contract, attributes(duck))]
pub fn derive_contract(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_contract(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Expose a struct's public fields as a duck-typing source.
///
/// Usage:
/// #[derive(Record)]
/// #[duck(rename_all = "PascalCase", methods)]
/// pub struct Order {
///   pub id: Uuid,
///   #[duck(readonly)] pub total: i64,
///   #[duck(nested)] pub customer: Option<Customer>,
///   #[duck(skip)] pub cache: Vec<u8>,
/// }
///
/// `methods` forwards to the `#[methods]` impl block of the same type.
#[proc_macro_derive(Record, attributes(duck))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_record(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Expose the public `&self` / `&mut self` methods of an inherent impl block.
/// Usage: #[methods(rename_all = "PascalCase")] impl Order { pub fn total(&self) -> i64 { .. } }
#[proc_macro_attribute]
pub fn methods(attr: TokenStream, item: TokenStream) -> TokenStream {
    let metas = match Punctuated::<Meta, Token![,]>::parse_terminated.parse(attr) {
        Ok(metas) => metas,
        Err(err) => return err.into_compile_error().into(),
    };
    let block = parse_macro_input!(item as ItemImpl);
    expand_methods(metas, block)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[derive(Clone, Copy)]
enum RenameRule {
    None,
    Pascal,
    Camel,
    Snake,
    Lower,
    Upper,
    ScreamingSnake,
    Kebab,
}

impl RenameRule {
    fn parse(lit: &LitStr) -> syn::Result<Self> {
        Ok(match lit.value().as_str() {
            "PascalCase" => RenameRule::Pascal,
            "camelCase" => RenameRule::Camel,
            "snake_case" => RenameRule::Snake,
            "lowercase" => RenameRule::Lower,
            "UPPERCASE" => RenameRule::Upper,
            "SCREAMING_SNAKE_CASE" => RenameRule::ScreamingSnake,
            "kebab-case" => RenameRule::Kebab,
            other => {
                return Err(syn::Error::new(
                    lit.span(),
                    format!("unknown rename rule {other:?}"),
                ))
            }
        })
    }

    fn apply(self, ident: &str) -> String {
        let ident = ident.strip_prefix("r#").unwrap_or(ident);
        let words = ident.split('_').filter(|w| !w.is_empty());
        match self {
            RenameRule::None => ident.to_string(),
            RenameRule::Pascal => words.map(capitalize).collect(),
            RenameRule::Camel => {
                let pascal: String = words.map(capitalize).collect();
                let mut chars = pascal.chars();
                match chars.next() {
                    Some(first) => first.to_lowercase().chain(chars).collect(),
                    None => pascal,
                }
            }
            RenameRule::Snake => ident.to_ascii_lowercase(),
            RenameRule::Lower => ident.to_ascii_lowercase(),
            RenameRule::Upper | RenameRule::ScreamingSnake => ident.to_ascii_uppercase(),
            RenameRule::Kebab => ident.to_ascii_lowercase().replace('_', "-"),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn duck_metas(attrs: &[Attribute]) -> syn::Result<Vec<Meta>> {
    let mut out = Vec::new();
    for attr in attrs.iter().filter(|a| a.path().is_ident("duck")) {
        out.extend(attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?);
    }
    Ok(out)
}

fn lit_str(expr: &Expr) -> syn::Result<LitStr> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(s), ..
        }) => Ok(s.clone()),
        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
    }
}

fn meta_key(meta: &Meta) -> String {
    meta.path()
        .get_ident()
        .map(|i| i.to_string())
        .unwrap_or_default()
}

fn unknown(meta: &Meta) -> syn::Error {
    syn::Error::new_spanned(meta, "unknown duck attribute")
}

fn type_desc(ty: &Type) -> TokenStream2 {
    quote! { <#ty as ::ducktype_core::Typed>::type_desc() }
}

fn return_type(output: &ReturnType) -> Type {
    match output {
        ReturnType::Default => parse_quote!(()),
        ReturnType::Type(_, ty) => (**ty).clone(),
    }
}

fn param_types(sig: &Signature) -> Vec<Type> {
    sig.inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(pat) => Some((*pat.ty).clone()),
            FnArg::Receiver(_) => None,
        })
        .collect()
}

fn check_unique(names: &mut HashSet<String>, name: &str, span: Span) -> syn::Result<()> {
    if !names.insert(name.to_string()) {
        return Err(syn::Error::new(span, format!("duplicate member name {name:?}")));
    }
    Ok(())
}

fn bound_type_params(generics: &Generics, bounds: TokenStream2) -> Generics {
    let bounds: Punctuated<TypeParamBound, Token![+]> = parse_quote!(#bounds);
    let mut generics = generics.clone();
    for param in generics.type_params_mut() {
        param.bounds.extend(bounds.iter().cloned());
    }
    generics
}

fn named_fields(input: &DeriveInput, what: &str) -> syn::Result<Vec<syn::Field>> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => Ok(named.named.iter().cloned().collect()),
            Fields::Unit => Ok(Vec::new()),
            Fields::Unnamed(_) => Err(syn::Error::new_spanned(
                &input.ident,
                format!("{what} requires named fields"),
            )),
        },
        _ => Err(syn::Error::new_spanned(
            &input.ident,
            format!("{what} can only be derived for structs"),
        )),
    }
}

fn expand_contract(input: DeriveInput) -> syn::Result<TokenStream2> {
    if let Some(lifetime) = input.generics.lifetimes().next() {
        return Err(syn::Error::new_spanned(
            lifetime,
            "contracts cannot have lifetime parameters",
        ));
    }
    let ident = &input.ident;
    let mut rename = RenameRule::None;
    let mut name: Option<LitStr> = None;
    let mut bases = Vec::new();
    let mut signatures = Vec::new();
    let mut trailing = Vec::new();
    let mut names = HashSet::new();

    for meta in duck_metas(&input.attrs)? {
        match (meta_key(&meta).as_str(), &meta) {
            ("rename_all", Meta::NameValue(nv)) => rename = RenameRule::parse(&lit_str(&nv.value)?)?,
            ("name", Meta::NameValue(nv)) => name = Some(lit_str(&nv.value)?),
            ("event", Meta::NameValue(nv)) => {
                let event = lit_str(&nv.value)?;
                trailing.push(quote! { decl.event(#event); });
            }
            ("extends", Meta::List(list)) => {
                let types =
                    Punctuated::<Type, Token![,]>::parse_terminated.parse2(list.tokens.clone())?;
                for ty in types {
                    bases.push(quote! { decl.extends::<#ty>(); });
                }
            }
            ("method", Meta::List(list)) => {
                signatures.push(syn::parse2::<Signature>(list.tokens.clone())?);
            }
            ("indexer", Meta::List(list)) => {
                let types =
                    Punctuated::<Type, Token![,]>::parse_terminated.parse2(list.tokens.clone())?;
                let types: Vec<&Type> = types.iter().collect();
                let [key, value] = types.as_slice() else {
                    return Err(syn::Error::new_spanned(list, "indexer takes (Key, Value)"));
                };
                let (key, value) = (type_desc(key), type_desc(value));
                trailing.push(quote! { decl.indexer(#key, #value); });
            }
            _ => return Err(unknown(&meta)),
        }
    }

    let mut fields = Vec::new();
    for field in named_fields(&input, "Contract")? {
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        let mut field_name = rename.apply(&field_ident.to_string());
        let mut access = quote! { ::ducktype_core::Access::Read };
        let mut skip = false;
        for meta in duck_metas(&field.attrs)? {
            match (meta_key(&meta).as_str(), &meta) {
                ("rename", Meta::NameValue(nv)) => field_name = lit_str(&nv.value)?.value(),
                ("set", Meta::Path(_)) => access = quote! { ::ducktype_core::Access::ReadWrite },
                ("write_only", Meta::Path(_)) => access = quote! { ::ducktype_core::Access::Write },
                ("skip", Meta::Path(_)) => skip = true,
                _ => return Err(unknown(&meta)),
            }
        }
        if skip {
            continue;
        }
        check_unique(&mut names, &field_name, field_ident.span())?;
        let ty = &field.ty;
        fields.push(quote! { decl.field::<#ty>(#field_name, #access); });
    }

    let mut methods = Vec::new();
    for sig in &signatures {
        let method_name = rename.apply(&sig.ident.to_string());
        check_unique(&mut names, &method_name, sig.ident.span())?;
        let params = param_types(sig).iter().map(type_desc).collect::<Vec<_>>();
        let returns = type_desc(&return_type(&sig.output));
        methods.push(quote! {
            decl.method(#method_name, ::std::vec![#(#params),*], #returns);
        });
    }

    let generic = input.generics.type_params().next().is_some();
    let generics = bound_type_params(&input.generics, quote!(::ducktype_core::Typed + 'static));
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let display_name = name
        .clone()
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), Span::call_site()));
    let name_fn = if generic && name.is_none() {
        quote! {}
    } else {
        quote! {
            fn contract_name() -> &'static str {
                #display_name
            }
        }
    };
    // Generic contracts have no single identity to register.
    let registration = if generic {
        quote! {}
    } else {
        quote! {
            ::ducktype_core::__private::inventory::submit! {
                ::ducktype_core::RegisteredContract {
                    name: #display_name,
                    contract: ::ducktype_core::ContractRef::of::<#ident>,
                }
            }
        }
    };

    Ok(quote! {
        impl #impl_generics ::ducktype_core::Contract for #ident #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn declare(decl: &mut ::ducktype_core::ContractDecl) {
                #(#fields)*
                #(#methods)*
                #(#trailing)*
                #(#bases)*
            }
            #name_fn
        }

        impl #impl_generics ::ducktype_core::Typed for #ident #ty_generics #where_clause {
            fn type_desc() -> ::ducktype_core::TypeDesc {
                ::ducktype_core::TypeDesc::Contract(::ducktype_core::ContractRef::of::<Self>())
            }
        }

        #registration
    })
}

struct RecordField {
    ident: syn::Ident,
    name: String,
    ty: Type,
    readable: bool,
    writable: bool,
    nested: bool,
}

fn expand_record(input: DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let mut rename = RenameRule::None;
    let mut name: Option<LitStr> = None;
    let mut with_methods = false;

    for meta in duck_metas(&input.attrs)? {
        match (meta_key(&meta).as_str(), &meta) {
            ("rename_all", Meta::NameValue(nv)) => rename = RenameRule::parse(&lit_str(&nv.value)?)?,
            ("name", Meta::NameValue(nv)) => name = Some(lit_str(&nv.value)?),
            ("methods", Meta::Path(_)) => with_methods = true,
            _ => return Err(unknown(&meta)),
        }
    }

    let mut fields = Vec::new();
    let mut names = HashSet::new();
    for field in named_fields(&input, "Record")? {
        // Only public fields are part of the record's surface.
        if !matches!(field.vis, Visibility::Public(_)) {
            continue;
        }
        let Some(field_ident) = field.ident.clone() else {
            continue;
        };
        let mut field_name = rename.apply(&field_ident.to_string());
        let (mut readable, mut writable) = (true, true);
        let (mut nested, mut nested_writable, mut skip) = (false, false, false);
        for meta in duck_metas(&field.attrs)? {
            match (meta_key(&meta).as_str(), &meta) {
                ("rename", Meta::NameValue(nv)) => field_name = lit_str(&nv.value)?.value(),
                ("readonly", Meta::Path(_)) => writable = false,
                ("write_only", Meta::Path(_)) => readable = false,
                ("nested", Meta::Path(_)) => nested = true,
                ("writable", Meta::Path(_)) => nested_writable = true,
                ("skip", Meta::Path(_)) => skip = true,
                _ => return Err(unknown(&meta)),
            }
        }
        if skip {
            continue;
        }
        if nested {
            writable = writable && nested_writable;
        }
        if !readable && !writable {
            return Err(syn::Error::new_spanned(
                &field_ident,
                "field is neither readable nor writable",
            ));
        }
        check_unique(&mut names, &field_name, field_ident.span())?;
        fields.push(RecordField {
            ident: field_ident,
            name: field_name,
            ty: field.ty.clone(),
            readable,
            writable,
            nested,
        });
    }

    let infos = fields.iter().map(|f| {
        let name = &f.name;
        let ty = type_desc(&f.ty);
        let access = match (f.readable, f.writable) {
            (true, true) => quote! { ::ducktype_core::Access::ReadWrite },
            (true, false) => quote! { ::ducktype_core::Access::Read },
            _ => quote! { ::ducktype_core::Access::Write },
        };
        let nested = f.nested.then(|| quote! { .nested() });
        quote! { ::ducktype_core::PropertyInfo::new(#name, #ty, #access) #nested }
    });
    let get_arms = fields.iter().filter(|f| f.readable).map(|f| {
        let (name, field) = (&f.name, &f.ident);
        quote! { #name => ::core::option::Option::Some(::ducktype_core::ToValue::to_value(&self.#field)), }
    });
    let set_arms = fields.iter().map(|f| {
        let (name, field) = (&f.name, &f.ident);
        if f.writable {
            quote! {
                #name => {
                    self.#field = ::ducktype_core::FromValue::from_value(value)?;
                    ::core::result::Result::Ok(())
                }
            }
        } else {
            quote! {
                #name => ::core::result::Result::Err(::ducktype_core::ValueError::ReadOnly(#name.to_string())),
            }
        }
    });
    let nested_arms = fields.iter().filter(|f| f.nested).map(|f| {
        let (name, field) = (&f.name, &f.ident);
        quote! { #name => ::ducktype_core::NestedSource::nested_source(&self.#field), }
    });
    let nested_mut_arms = fields.iter().filter(|f| f.nested).map(|f| {
        let (name, field) = (&f.name, &f.ident);
        quote! { #name => ::ducktype_core::NestedSource::nested_source_mut(&mut self.#field), }
    });
    let snapshot = fields.iter().filter(|f| f.readable).map(|f| {
        let (name, field) = (&f.name, &f.ident);
        quote! { map.insert(#name, ::ducktype_core::ToValue::to_value(&self.#field)); }
    });
    let method_fns = with_methods.then(|| {
        quote! {
            fn methods(&self) -> ::std::vec::Vec<::ducktype_core::MethodInfo> {
                <Self as ::ducktype_core::RecordMethods>::method_infos()
            }

            fn invoke(
                &mut self,
                name: &str,
                args: ::std::vec::Vec<::ducktype_core::Value>,
            ) -> ::core::result::Result<::ducktype_core::Value, ::ducktype_core::ValueError> {
                ::ducktype_core::RecordMethods::invoke_method(self, name, args)
            }
        }
    });

    let record_name = name.unwrap_or_else(|| LitStr::new(&ident.to_string(), Span::call_site()));
    let generics = bound_type_params(
        &input.generics,
        quote!(::ducktype_core::Typed + ::ducktype_core::ToValue + ::ducktype_core::FromValue),
    );
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::ducktype_core::Record for #ident #ty_generics #where_clause {
            fn properties(&self) -> ::std::vec::Vec<::ducktype_core::PropertyInfo> {
                ::std::vec![#(#infos),*]
            }

            fn get(&self, name: &str) -> ::core::option::Option<::ducktype_core::Value> {
                match name {
                    #(#get_arms)*
                    _ => ::core::option::Option::None,
                }
            }

            #[allow(unused_variables)]
            fn set(
                &mut self,
                name: &str,
                value: ::ducktype_core::Value,
            ) -> ::core::result::Result<(), ::ducktype_core::ValueError> {
                match name {
                    #(#set_arms)*
                    _ => ::core::result::Result::Err(::ducktype_core::ValueError::NoSuchMember(name.to_string())),
                }
            }

            fn nested(&self, name: &str) -> ::core::option::Option<::ducktype_core::SourceRef<'_>> {
                match name {
                    #(#nested_arms)*
                    _ => ::core::option::Option::None,
                }
            }

            fn nested_mut(&mut self, name: &str) -> ::core::option::Option<::ducktype_core::SourceMut<'_>> {
                match name {
                    #(#nested_mut_arms)*
                    _ => ::core::option::Option::None,
                }
            }

            #method_fns
        }

        impl #impl_generics ::ducktype_core::AsSource for #ident #ty_generics #where_clause {
            fn as_source(&self) -> ::ducktype_core::SourceRef<'_> {
                ::ducktype_core::SourceRef::Record(self)
            }

            fn as_source_mut(&mut self) -> ::ducktype_core::SourceMut<'_> {
                ::ducktype_core::SourceMut::Record(self)
            }
        }

        impl #impl_generics ::ducktype_core::NestedSource for #ident #ty_generics #where_clause {
            fn nested_source(&self) -> ::core::option::Option<::ducktype_core::SourceRef<'_>> {
                ::core::option::Option::Some(::ducktype_core::SourceRef::Record(self))
            }

            fn nested_source_mut(&mut self) -> ::core::option::Option<::ducktype_core::SourceMut<'_>> {
                ::core::option::Option::Some(::ducktype_core::SourceMut::Record(self))
            }
        }

        impl #impl_generics ::ducktype_core::Typed for #ident #ty_generics #where_clause {
            fn type_desc() -> ::ducktype_core::TypeDesc {
                ::ducktype_core::TypeDesc::Record(#record_name)
            }
        }

        impl #impl_generics ::ducktype_core::ToValue for #ident #ty_generics #where_clause {
            #[allow(unused_mut)]
            fn to_value(&self) -> ::ducktype_core::Value {
                let mut map = ::ducktype_core::DuckMap::new();
                #(#snapshot)*
                ::ducktype_core::Value::Map(map)
            }
        }
    })
}

fn expand_methods(
    metas: Punctuated<Meta, Token![,]>,
    mut block: ItemImpl,
) -> syn::Result<TokenStream2> {
    if let Some((_, path, _)) = &block.trait_ {
        return Err(syn::Error::new_spanned(
            path,
            "#[methods] goes on an inherent impl block",
        ));
    }
    let mut rename = RenameRule::None;
    for meta in &metas {
        match (meta_key(meta).as_str(), meta) {
            ("rename_all", Meta::NameValue(nv)) => rename = RenameRule::parse(&lit_str(&nv.value)?)?,
            _ => return Err(unknown(meta)),
        }
    }

    let mut infos = Vec::new();
    let mut arms = Vec::new();
    let mut names = HashSet::new();
    for item in block.items.iter_mut() {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        let metas = duck_metas(&method.attrs)?;
        method.attrs.retain(|a| !a.path().is_ident("duck"));

        let mut method_name = rename.apply(&method.sig.ident.to_string());
        let mut skip = false;
        for meta in &metas {
            match (meta_key(meta).as_str(), meta) {
                ("rename", Meta::NameValue(nv)) => method_name = lit_str(&nv.value)?.value(),
                ("skip", Meta::Path(_)) => skip = true,
                _ => return Err(unknown(meta)),
            }
        }
        let by_ref = method
            .sig
            .receiver()
            .is_some_and(|receiver| receiver.reference.is_some());
        let exposed = matches!(method.vis, Visibility::Public(_))
            && by_ref
            && method.sig.generics.params.is_empty()
            && method.sig.asyncness.is_none();
        if skip || !exposed {
            continue;
        }
        check_unique(&mut names, &method_name, method.sig.ident.span())?;

        let params = param_types(&method.sig);
        let returns = return_type(&method.sig.output);
        let param_descs = params.iter().map(type_desc);
        let return_desc = type_desc(&returns);
        infos.push(quote! {
            ::ducktype_core::MethodInfo::new(#method_name, ::std::vec![#(#param_descs),*], #return_desc)
        });

        let fn_ident = &method.sig.ident;
        let arg_idents: Vec<_> = (0..params.len()).map(|i| format_ident!("arg{}", i)).collect();
        arms.push(quote! {
            #method_name => {
                #(
                    let #arg_idents: #params = ::ducktype_core::FromValue::from_value(
                        args.next().unwrap_or_default(),
                    )?;
                )*
                let out = self.#fn_ident(#(#arg_idents),*);
                ::core::result::Result::Ok(::ducktype_core::ToValue::to_value(&out))
            }
        });
    }

    let self_ty = &block.self_ty;
    let (impl_generics, _, where_clause) = block.generics.split_for_impl();
    let table = quote! {
        impl #impl_generics ::ducktype_core::RecordMethods for #self_ty #where_clause {
            fn method_infos() -> ::std::vec::Vec<::ducktype_core::MethodInfo> {
                ::std::vec![#(#infos),*]
            }

            #[allow(unused_mut, unused_variables, clippy::let_unit_value)]
            fn invoke_method(
                &mut self,
                name: &str,
                args: ::std::vec::Vec<::ducktype_core::Value>,
            ) -> ::core::result::Result<::ducktype_core::Value, ::ducktype_core::ValueError> {
                let mut args = args.into_iter();
                match name {
                    #(#arms)*
                    _ => ::core::result::Result::Err(::ducktype_core::ValueError::NoSuchMember(name.to_string())),
                }
            }
        }
    };

    Ok(quote! {
        #block
        #table
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_rules_follow_serde_spelling() {
        assert_eq!(RenameRule::Pascal.apply("actor_id"), "ActorId");
        assert_eq!(RenameRule::Camel.apply("actor_id"), "actorId");
        assert_eq!(RenameRule::Snake.apply("actor_id"), "actor_id");
        assert_eq!(RenameRule::ScreamingSnake.apply("actor_id"), "ACTOR_ID");
        assert_eq!(RenameRule::Kebab.apply("actor_id"), "actor-id");
        assert_eq!(RenameRule::Pascal.apply("r#type"), "Type");
        assert_eq!(RenameRule::None.apply("id"), "id");
    }

    #[test]
    fn unknown_rename_rule_is_an_error() {
        let lit = LitStr::new("Title Case", Span::call_site());
        assert!(RenameRule::parse(&lit).is_err());
    }

    #[test]
    fn contract_expansion_registers_non_generic_contracts() {
        let input: DeriveInput = parse_quote! {
            #[duck(rename_all = "PascalCase", method(fn greet(&self, name: String) -> String))]
            struct Greeter {
                #[duck(set)]
                actor_id: u32,
            }
        };
        let out = expand_contract(input).unwrap().to_string();
        assert!(out.contains("\"ActorId\""));
        assert!(out.contains("\"Greet\""));
        assert!(out.contains("RegisteredContract"));
        assert!(out.contains("ReadWrite"));
    }

    #[test]
    fn generic_contracts_are_not_registered() {
        let input: DeriveInput = parse_quote! {
            struct Payload<T> { value: T }
        };
        let out = expand_contract(input).unwrap().to_string();
        assert!(!out.contains("RegisteredContract"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let input: DeriveInput = parse_quote! {
            #[duck(rename_all = "lowercase")]
            struct Clash { #[duck(rename = "id")] other: u32, id: u32 }
        };
        assert!(expand_contract(input).is_err());
    }

    #[test]
    fn record_expansion_hides_private_fields() {
        let input: DeriveInput = parse_quote! {
            pub struct Order { pub total: i64, secret: String }
        };
        let out = expand_record(input).unwrap().to_string();
        assert!(out.contains("\"total\""));
        assert!(!out.contains("\"secret\""));
    }

    #[test]
    fn methods_skip_private_and_static_functions() {
        let block: ItemImpl = parse_quote! {
            impl Order {
                pub fn total(&self) -> i64 { 0 }
                #[duck(rename = "Bump")]
                pub fn bump(&mut self, by: i64) {}
                fn hidden(&self) {}
                pub fn new() -> Self { todo!() }
            }
        };
        let out = expand_methods(Punctuated::new(), block).unwrap().to_string();
        assert!(out.contains("\"total\""));
        assert!(out.contains("\"Bump\""));
        assert!(!out.contains("\"hidden\""));
        assert!(!out.contains("\"new\""));
        assert!(!out.contains("duck ("));
    }
}
