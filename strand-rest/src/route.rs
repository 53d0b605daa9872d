//! Deterministic mapping from operation identifiers to HTTP routes.
//!
//! The verb and relative path of every operation are derived mechanically
//! from its identifier, so two implementations of the same contract agree on
//! the wire without further coordination. Explicit method/path overrides and
//! property accessors take precedence over the verb-prefix table.

use crate::contract::{OpSpec, Property};

use http::Method;

/// Naming convention applied to derived path components.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MethodStyle {
    /// Leave identifiers untouched.
    Unaltered,
    /// `getHTMLEntity` → `getHTMLEntity`, `HTMLEntity` → `htmlEntity`.
    CamelCase,
    /// Like camel case with the first letter upper-cased.
    PascalCase,
    /// All lower case, no separators.
    LowerCase,
    /// All upper case, no separators.
    UpperCase,
    /// `getHTMLEntity` → `get_html_entity`. The default.
    #[default]
    LowerUnderscored,
    /// `getHTMLEntity` → `GET_HTML_ENTITY`.
    UpperUnderscored,
}

/// Route derived for one operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteSpec {
    /// True iff an explicit path attribute was present.
    pub path_overridden: bool,
    /// HTTP method to register/issue.
    pub method: Method,
    /// Relative path under the contract prefix (style already applied
    /// unless overridden).
    pub path: String,
}

/// Verb-prefix table, in priority order.
static VERB_PREFIXES: [(&str, Method); 12] = [
    ("get", Method::GET),
    ("query", Method::GET),
    ("put", Method::PUT),
    ("set", Method::PUT),
    ("update", Method::PATCH),
    ("patch", Method::PATCH),
    ("add", Method::POST),
    ("create", Method::POST),
    ("post", Method::POST),
    ("remove", Method::DELETE),
    ("erase", Method::DELETE),
    ("delete", Method::DELETE),
];

/// Infer `(method, remaining identifier)` from a verb prefix, if any.
pub fn method_from_name(name: &str) -> Option<(Method, &str)> {
    VERB_PREFIXES.iter().find_map(|(prefix, method)| {
        name.strip_prefix(prefix)
            .map(|remainder| (method.clone(), remainder))
    })
}

/// Compute the route of an operation under the given style.
pub fn route_for(spec: &OpSpec, style: MethodStyle) -> RouteSpec {
    let (derived_method, derived_path) = match spec.property {
        Property::Getter => (Method::GET, spec.name.clone()),
        Property::Setter => (Method::PUT, spec.name.clone()),
        Property::None => match method_from_name(&spec.name) {
            Some((method, remainder)) => (method, remainder.to_string()),
            None if spec.name == "index" => (Method::GET, String::new()),
            None => (Method::POST, spec.name.clone()),
        },
    };
    let method = spec.method.clone().unwrap_or(derived_method);
    let path_overridden = spec.path.is_some();
    let path = match &spec.path {
        Some(path) => path.clone(),
        None => adjust_method_style(&derived_path, style),
    };
    RouteSpec {
        path_overridden,
        method,
        path,
    }
}

/// The URL prefix a contract mounts at.
///
/// No override mounts at `/`; an empty override derives the prefix from the
/// stylised contract name; anything else is normalized to lead and trail
/// with `/`.
pub fn root_path(contract_name: &str, root: Option<&str>, style: MethodStyle) -> String {
    match root {
        None => "/".to_string(),
        Some("") => format!("/{}/", adjust_method_style(contract_name, style)),
        Some(path) => {
            let trimmed = path.trim_matches('/');
            if trimmed.is_empty() {
                "/".to_string()
            } else {
                format!("/{trimmed}/")
            }
        }
    }
}

/// Transform an identifier into the given naming style.
pub fn adjust_method_style(name: &str, style: MethodStyle) -> String {
    if name.is_empty() {
        return String::new();
    }
    match style {
        MethodStyle::Unaltered => name.to_string(),
        MethodStyle::LowerCase => name.to_lowercase(),
        MethodStyle::UpperCase => name.to_uppercase(),
        MethodStyle::CamelCase => camel_case(name),
        MethodStyle::PascalCase => {
            let camel = camel_case(name);
            let mut chars = camel.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => camel,
            }
        }
        MethodStyle::LowerUnderscored => split_words(name)
            .iter()
            .map(|word| word.to_lowercase())
            .collect::<Vec<_>>()
            .join("_"),
        MethodStyle::UpperUnderscored => split_words(name)
            .iter()
            .map(|word| word.to_uppercase())
            .collect::<Vec<_>>()
            .join("_"),
    }
}

/// Lower-case the leading upper-case run, keeping its last letter when a
/// lower-case letter follows (so an acronym keeps starting the next word).
fn camel_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let run = chars.iter().take_while(|c| c.is_uppercase()).count();
    if run == 0 {
        return name.to_string();
    }
    let boundary = if run == chars.len() || run == 1 {
        run
    } else if chars[run].is_lowercase() {
        run - 1
    } else {
        run
    };
    chars[..boundary]
        .iter()
        .flat_map(|c| c.to_lowercase())
        .chain(chars[boundary..].iter().copied())
        .collect()
}

/// Split an identifier into words at case transitions, treating an
/// upper-case run as a single acronym token.
fn split_words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words = Vec::new();
    let mut start = 0;
    for i in 1..chars.len() {
        let prev_upper = chars[i - 1].is_uppercase();
        let cur_upper = chars[i].is_uppercase();
        if cur_upper && !prev_upper {
            words.push(chars[start..i].iter().collect());
            start = i;
        } else if !cur_upper
            && prev_upper
            && i >= 2
            && chars[i - 2].is_uppercase()
            && i - 1 > start
        {
            // An acronym run ends here; its last letter starts the next word.
            words.push(chars[start..i - 1].iter().collect());
            start = i - 1;
        }
    }
    words.push(chars[start..].iter().collect());
    words
}
