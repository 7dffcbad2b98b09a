//! Java type name helpers
//!
//! Heap dumps name array types `Foo[][]` and class objects
//! `java.lang.Class<Foo>`. Deobfuscation maps only bare class names, so both
//! decorations are stripped before lookup and restored afterwards.

const CLASS_TEMPLATE: &str = "java.lang.Class<";

/// A type name split into its bare class name and decorations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedType<'a> {
    pub name: &'a str,
    pub is_static_class: bool,
    pub number_of_arrays: usize,
}

/// `Foo` for `java.lang.Class<Foo>`
pub fn static_class_type_name(type_name: &str) -> Option<&str> {
    type_name
        .strip_prefix(CLASS_TEMPLATE)
        .and_then(|rest| rest.strip_suffix('>'))
}

/// Number of trailing `[]` pairs
pub fn number_of_arrays(type_name: &str) -> usize {
    let mut rest = type_name;
    let mut arrays = 0;
    while let Some(stripped) = rest.strip_suffix("[]") {
        rest = stripped;
        arrays += 1;
    }
    arrays
}

pub fn normalize_type_name(type_name: &str) -> NormalizedType<'_> {
    let static_class = static_class_type_name(type_name);
    let name = static_class.unwrap_or(type_name);
    let number_of_arrays = number_of_arrays(name);
    NormalizedType {
        name: &name[..name.len() - 2 * number_of_arrays],
        is_static_class: static_class.is_some(),
        number_of_arrays,
    }
}

/// Re-apply the decorations of `normalized` to `deobfuscated`.
pub fn denormalize_type_name(normalized: &NormalizedType<'_>, deobfuscated: &str) -> String {
    let mut result = String::with_capacity(deobfuscated.len() + 2 * normalized.number_of_arrays);
    result.push_str(deobfuscated);
    for _ in 0..normalized.number_of_arrays {
        result.push_str("[]");
    }
    if normalized.is_static_class {
        result = format!("{CLASS_TEMPLATE}{result}>");
    }
    result
}
