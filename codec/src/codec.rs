use crate::error::CodecError;
use crate::hash::ObjectHash;
use crate::recipe::{Kind, Recipe, RecipeRegistry};
use crate::value::{Object, Reference, Value};

const NS: &str = "//refin.io/";

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '&' {
            let rest: String = chars.clone().collect();
            if let Some(tail) = rest.strip_prefix("amp;") {
                out.push('&');
                for _ in 0.."amp;".len() {
                    chars.next();
                }
                let _ = tail;
            } else if rest.strip_prefix("lt;").is_some() {
                out.push('<');
                for _ in 0.."lt;".len() {
                    chars.next();
                }
            } else if rest.strip_prefix("gt;").is_some() {
                out.push('>');
                for _ in 0.."gt;".len() {
                    chars.next();
                }
            } else {
                out.push('&');
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn reference_tag(kind: &Kind) -> Result<(), CodecError> {
    match kind {
        Kind::RefObject | Kind::RefId | Kind::RefBlob | Kind::RefClob => Ok(()),
        _ => Err(CodecError::Malformed("expected a reference kind".into())),
    }
}

fn check_reference_kind(type_name: &str, field: &str, kind: &Kind, ref_: &Reference) -> Result<(), CodecError> {
    reference_tag(kind)?;
    let matches = matches!(
        (kind, ref_),
        (Kind::RefObject, Reference::Object(_))
            | (Kind::RefId, Reference::Id(_))
            | (Kind::RefBlob, Reference::Blob(_))
            | (Kind::RefClob, Reference::Clob(_))
    );
    if matches {
        Ok(())
    } else {
        Err(CodecError::WrongKind {
            type_name: type_name.to_string(),
            field: field.to_string(),
        })
    }
}

/// Renders one [`Value`] according to `kind`, optionally wrapped with an
/// `itemprop` attribute (absent when nested inside a collection item).
fn render_value(
    type_name: &str,
    field: &str,
    value: &Value,
    kind: &Kind,
    itemprop: Option<&str>,
) -> Result<String, CodecError> {
    let wrong = || CodecError::WrongKind {
        type_name: type_name.to_string(),
        field: field.to_string(),
    };
    let attr = |name: &str| format!(" itemprop=\"{name}\"");
    match (kind, value) {
        (Kind::Bool, Value::Bool(b)) => {
            let a = itemprop.map(|n| attr(n)).unwrap_or_default();
            Ok(format!("<span{a}>{}</span>", if *b { "true" } else { "false" }))
        }
        (Kind::Number, Value::Number(n)) => {
            let a = itemprop.map(|n| attr(n)).unwrap_or_default();
            Ok(format!("<span{a}>{n}</span>"))
        }
        (Kind::Text, Value::Text(s)) => {
            let a = itemprop.map(|n| attr(n)).unwrap_or_default();
            Ok(format!("<span{a}>{}</span>", escape_text(s)))
        }
        (Kind::RefObject, Value::Reference(r @ Reference::Object(_)))
        | (Kind::RefId, Value::Reference(r @ Reference::Id(_)))
        | (Kind::RefBlob, Value::Reference(r @ Reference::Blob(_)))
        | (Kind::RefClob, Value::Reference(r @ Reference::Clob(_))) => {
            check_reference_kind(type_name, field, kind, r)?;
            let a = itemprop.map(|n| attr(n)).unwrap_or_default();
            let dt = r.tag().map(|t| format!(" data-type=\"{t}\"")).unwrap_or_default();
            Ok(format!("<a{a}{dt}>{}</a>", r.hash()))
        }
        (Kind::Bag(inner), Value::Bag(items)) | (Kind::Array(inner), Value::Array(items)) => {
            let mut rendered: Vec<String> = items
                .iter()
                .map(|it| render_value(type_name, field, it, inner, None))
                .collect::<Result<_, _>>()?;
            if matches!(kind, Kind::Bag(_)) {
                rendered.sort();
            }
            let a = itemprop.map(|n| attr(n)).unwrap_or_default();
            let body: String = rendered.into_iter().map(|r| format!("<li>{r}</li>")).collect();
            Ok(format!("<ul{a}>{body}</ul>"))
        }
        (Kind::Set(inner), Value::Set(items)) => {
            let mut seen = std::collections::BTreeSet::new();
            let mut rendered = Vec::with_capacity(items.len());
            for it in items {
                let r = render_value(type_name, field, it, inner, None)?;
                if seen.insert(r.clone()) {
                    rendered.push(r);
                }
            }
            rendered.sort();
            let a = itemprop.map(|n| attr(n)).unwrap_or_default();
            let body: String = rendered.into_iter().map(|r| format!("<li>{r}</li>")).collect();
            Ok(format!("<ul{a}>{body}</ul>"))
        }
        (Kind::Map(kk, vk), Value::Map(entries)) => {
            let mut rendered: Vec<(String, String)> = entries
                .iter()
                .map(|(k, v)| {
                    let rk = render_value(type_name, field, k, kk, Some("key"))?;
                    let rv = render_value(type_name, field, v, vk, Some("value"))?;
                    Ok::<_, CodecError>((rk, rv))
                })
                .collect::<Result<_, _>>()?;
            rendered.sort_by(|a, b| a.0.cmp(&b.0));
            let a = itemprop.map(|n| attr(n)).unwrap_or_default();
            let body: String = rendered
                .into_iter()
                .map(|(k, v)| format!("<li>{k}{v}</li>"))
                .collect();
            Ok(format!("<ul{a}>{body}</ul>"))
        }
        _ => Err(wrong()),
    }
}

/// Encodes `obj` against `recipe` to its canonical microdata text (§4.1, §6).
pub fn encode(recipe: &Recipe, obj: &Object) -> Result<String, CodecError> {
    if recipe.type_name != obj.type_name {
        return Err(CodecError::WrongKind {
            type_name: obj.type_name.clone(),
            field: String::new(),
        });
    }
    let mut body = String::new();
    for def in &recipe.fields {
        let value = obj.field(&def.name).ok_or_else(|| CodecError::MissingField {
            type_name: recipe.type_name.clone(),
            field: def.name.clone(),
        })?;
        body.push_str(&render_value(&recipe.type_name, &def.name, value, &def.kind, Some(&def.name))?);
    }
    Ok(format!(
        "<div itemscope itemtype=\"{NS}{}\">{body}</div>",
        recipe.type_name
    ))
}

/// Computes the content hash of canonical microdata (§3, §4.1).
pub fn hash_of(microdata: &str) -> ObjectHash {
    ObjectHash::of(microdata.as_bytes())
}

/// Parser over the fixed microdata grammar we emit; there is no general
/// HTML support here, only exactly what [`encode`] produces.
struct Parser<'a> {
    rest: &'a str,
}

impl<'a> Parser<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }

    fn expect(&mut self, lit: &str) -> Result<(), CodecError> {
        self.rest = self
            .rest
            .strip_prefix(lit)
            .ok_or_else(|| CodecError::Malformed(format!("expected `{lit}`")))?;
        Ok(())
    }

    fn take_until(&mut self, delim: &str) -> Result<&'a str, CodecError> {
        let idx = self
            .rest
            .find(delim)
            .ok_or_else(|| CodecError::Malformed(format!("expected `{delim}`")))?;
        let (head, tail) = self.rest.split_at(idx);
        self.rest = tail;
        Ok(head)
    }

    fn peek(&self, lit: &str) -> bool {
        self.rest.starts_with(lit)
    }

    fn eof(&self) -> bool {
        self.rest.is_empty()
    }
}

fn parse_scalar(kind: &Kind, p: &mut Parser<'_>) -> Result<Value, CodecError> {
    let inner = p.take_until("</span>")?;
    p.expect("</span>")?;
    match kind {
        Kind::Bool => match inner {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(CodecError::Malformed(format!("`{inner}` is not a boolean"))),
        },
        Kind::Number => {
            let valid = inner == "0"
                || (inner.starts_with('-') && inner.len() > 1 && !inner[1..].starts_with('0'))
                || (!inner.starts_with('0') && !inner.starts_with('-'));
            if !valid || inner.is_empty() {
                return Err(CodecError::InvalidNumber(inner.to_string()));
            }
            inner
                .parse::<i64>()
                .map(Value::Number)
                .map_err(|_| CodecError::InvalidNumber(inner.to_string()))
        }
        Kind::Text => Ok(Value::Text(unescape_text(inner))),
        _ => Err(CodecError::Malformed("unexpected scalar field".into())),
    }
}

fn parse_reference(kind: &Kind, p: &mut Parser<'_>) -> Result<Value, CodecError> {
    let expected_tag = match kind {
        Kind::RefObject => None,
        Kind::RefId => Some("id"),
        Kind::RefBlob => Some("blob"),
        Kind::RefClob => Some("clob"),
        _ => return Err(CodecError::Malformed("unexpected reference field".into())),
    };
    let tag = if p.peek(" data-type=\"") {
        p.expect(" data-type=\"")?;
        let t = p.take_until("\"")?.to_string();
        p.expect("\"")?;
        Some(t)
    } else {
        None
    };
    if tag.as_deref() != expected_tag {
        return Err(CodecError::Malformed("reference data-type mismatch".into()));
    }
    p.expect(">")?;
    let hash_str = p.take_until("</a>")?;
    p.expect("</a>")?;
    let hash: ObjectHash = hash_str.parse()?;
    let reference = match kind {
        Kind::RefObject => Reference::Object(hash),
        Kind::RefId => Reference::Id(hash),
        Kind::RefBlob => Reference::Blob(hash),
        Kind::RefClob => Reference::Clob(hash),
        _ => unreachable!(),
    };
    Ok(Value::Reference(reference))
}

/// Parses the *content* of one `<li>...</li>` item (no outer `itemprop`),
/// dispatching on `kind`.
fn parse_item(kind: &Kind, p: &mut Parser<'_>) -> Result<Value, CodecError> {
    match kind {
        Kind::Bool | Kind::Number | Kind::Text => {
            p.expect("<span>")?;
            parse_scalar(kind, p)
        }
        Kind::RefObject | Kind::RefId | Kind::RefBlob | Kind::RefClob => {
            p.expect("<a")?;
            parse_reference(kind, p)
        }
        Kind::Bag(inner) => parse_collection_body(inner, p).map(Value::Bag),
        Kind::Set(inner) => parse_collection_body(inner, p).map(Value::Set),
        Kind::Array(inner) => parse_collection_body(inner, p).map(Value::Array),
        Kind::Map(kk, vk) => parse_map_body(kk, vk, p).map(Value::Map),
    }
}

fn parse_collection_body(inner: &Kind, p: &mut Parser<'_>) -> Result<Vec<Value>, CodecError> {
    p.expect("<ul>")?;
    let mut items = Vec::new();
    while !p.peek("</ul>") {
        p.expect("<li>")?;
        items.push(parse_item(inner, p)?);
        p.expect("</li>")?;
    }
    p.expect("</ul>")?;
    Ok(items)
}

fn parse_map_body(kk: &Kind, vk: &Kind, p: &mut Parser<'_>) -> Result<Vec<(Value, Value)>, CodecError> {
    p.expect("<ul>")?;
    let mut items = Vec::new();
    while !p.peek("</ul>") {
        p.expect("<li>")?;
        let key = parse_field_body(kk, "key", p)?;
        let val = parse_field_body(vk, "value", p)?;
        items.push((key, val));
        p.expect("</li>")?;
    }
    p.expect("</ul>")?;
    Ok(items)
}

/// Parses a field whose opening tag carries `itemprop="name"` (top-level
/// fields and map key/value slots, which use the same attributed form).
fn parse_field_body(kind: &Kind, _name: &str, p: &mut Parser<'_>) -> Result<Value, CodecError> {
    match kind {
        Kind::Bool | Kind::Number | Kind::Text => {
            p.expect("<span itemprop=\"")?;
            p.take_until("\">")?;
            p.expect("\">")?;
            parse_scalar(kind, p)
        }
        Kind::RefObject | Kind::RefId | Kind::RefBlob | Kind::RefClob => {
            p.expect("<a itemprop=\"")?;
            p.take_until("\"")?;
            p.expect("\"")?;
            parse_reference(kind, p)
        }
        Kind::Bag(inner) => {
            p.expect("<ul itemprop=\"")?;
            p.take_until("\">")?;
            p.expect("\">")?;
            let items = parse_collection_items(inner, p)?;
            Ok(Value::Bag(items))
        }
        Kind::Set(inner) => {
            p.expect("<ul itemprop=\"")?;
            p.take_until("\">")?;
            p.expect("\">")?;
            let items = parse_collection_items(inner, p)?;
            Ok(Value::Set(items))
        }
        Kind::Array(inner) => {
            p.expect("<ul itemprop=\"")?;
            p.take_until("\">")?;
            p.expect("\">")?;
            let items = parse_collection_items(inner, p)?;
            Ok(Value::Array(items))
        }
        Kind::Map(kk, vk) => {
            p.expect("<ul itemprop=\"")?;
            p.take_until("\">")?;
            p.expect("\">")?;
            let entries = parse_map_items(kk, vk, p)?;
            Ok(Value::Map(entries))
        }
    }
}

fn parse_collection_items(inner: &Kind, p: &mut Parser<'_>) -> Result<Vec<Value>, CodecError> {
    let mut items = Vec::new();
    while !p.peek("</ul>") {
        p.expect("<li>")?;
        items.push(parse_item(inner, p)?);
        p.expect("</li>")?;
    }
    p.expect("</ul>")?;
    Ok(items)
}

fn parse_map_items(kk: &Kind, vk: &Kind, p: &mut Parser<'_>) -> Result<Vec<(Value, Value)>, CodecError> {
    let mut items = Vec::new();
    while !p.peek("</ul>") {
        p.expect("<li>")?;
        let key = parse_field_body(kk, "key", p)?;
        let val = parse_field_body(vk, "value", p)?;
        items.push((key, val));
        p.expect("</li>")?;
    }
    p.expect("</ul>")?;
    Ok(items)
}

/// Decodes canonical microdata to a typed [`Object`], rejecting any input
/// that is not exactly the canonical encoding of its decoded value (§4.1).
pub fn decode(registry: &RecipeRegistry, microdata: &str) -> Result<Object, CodecError> {
    let mut p = Parser::new(microdata);
    p.expect(&format!("<div itemscope itemtype=\"{NS}"))?;
    let type_name = p.take_until("\">")?.to_string();
    p.expect("\">")?;
    let recipe = registry.get(&type_name)?;

    let mut fields = Vec::with_capacity(recipe.fields.len());
    for def in &recipe.fields {
        let value = parse_field_body(&def.kind, &def.name, &mut p)?;
        fields.push((def.name.clone(), value));
    }
    p.expect("</div>")?;
    if !p.eof() {
        return Err(CodecError::Malformed("trailing bytes after object".into()));
    }

    let obj = Object::new(type_name, fields);
    let re_encoded = encode(&recipe, &obj)?;
    if re_encoded != microdata {
        return Err(CodecError::NotCanonical);
    }
    Ok(obj)
}

/// Builds the microdata text for the ID-object: only identity-marked
/// fields, in recipe order, under the same type tag (§3 ID object).
pub fn encode_id_object(recipe: &Recipe, obj: &Object) -> Result<String, CodecError> {
    let mut body = String::new();
    for def in recipe.id_fields() {
        let value = obj.field(&def.name).ok_or_else(|| CodecError::MissingField {
            type_name: recipe.type_name.clone(),
            field: def.name.clone(),
        })?;
        body.push_str(&render_value(&recipe.type_name, &def.name, value, &def.kind, Some(&def.name))?);
    }
    Ok(format!(
        "<div itemscope itemtype=\"{NS}{}\">{body}</div>",
        recipe.type_name
    ))
}

/// Computes the ID-hash of a versioned object: the content hash of its
/// ID-object microdata (§3).
pub fn id_hash(recipe: &Recipe, obj: &Object) -> Result<ObjectHash, CodecError> {
    Ok(hash_of(&encode_id_object(recipe, obj)?))
}
