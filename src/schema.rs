//! JSON declaration schemas.
//!
//! A schema lists declarations in dependency order. Each one names its
//! parameters, its bases (with argument expressions) and a few members whose
//! behavior is picked from a fixed set of actions:
//!
//! ```json
//! {
//!   "declarations": [
//!     { "name": "Base", "params": [{ "name": "T", "default": "int" }],
//!       "members": [{ "name": "check", "kind": "alias_aware", "action": "receiver" }] },
//!     { "name": "Child", "params": [{ "name": "U" }],
//!       "bases": [{ "decl": "Base", "args": ["U"] }],
//!       "members": [{ "name": "check", "kind": "alias_aware", "action": "redirect" }] }
//!   ]
//! }
//! ```
//!
//! Argument names resolve, in order, to an own parameter (base arguments
//! only), a previously declared declaration, or an intrinsic.

use reify_solver::{
    ArgExpr, BaseSpec, CallContext, DeclId, DeclarationInfo, Member, ParamInfo, ParamRef,
    ReifyError, ReifyResult, TypeSystem, Value,
};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

// =============================================================================
// Schema types
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Schema {
    #[serde(default)]
    pub declarations: Vec<DeclSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeclSpec {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    #[serde(default)]
    pub bases: Vec<BaseRef>,
    #[serde(default)]
    pub members: Vec<MemberSpec>,
    /// Runs its own generic protocol; never specialized or intercepted.
    #[serde(default)]
    pub foreign: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamSpec {
    pub name: String,
    #[serde(default)]
    pub default: Option<ArgSpec>,
    #[serde(default)]
    pub bound: Option<ArgSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseRef {
    pub decl: String,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
}

/// `"int"` or `{ "decl": "List", "args": ["T"] }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgSpec {
    Name(String),
    Nested {
        decl: String,
        #[serde(default)]
        args: Vec<ArgSpec>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    AliasAware,
    Plain,
    Attribute,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberAction {
    /// Return the receiver as a value.
    Receiver,
    /// Invoke the same member on the next declaration in the resolution order.
    Redirect,
    /// Return the receiver's arguments as seen by `ancestor`.
    Resolve,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemberSpec {
    pub name: String,
    pub kind: MemberKind,
    #[serde(default)]
    pub action: Option<MemberAction>,
    /// Target of the `resolve` action.
    #[serde(default)]
    pub ancestor: Option<String>,
    /// Value of an attribute.
    #[serde(default)]
    pub value: Option<ArgSpec>,
}

impl Schema {
    pub fn from_json_str(text: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(text).map_err(SchemaError::Parse)
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum SchemaError {
    Parse(serde_json::Error),
    /// A name used as a base or nested declaration is not declared (yet).
    UnknownDeclaration {
        name: String,
    },
    MissingField {
        decl: String,
        member: String,
        field: &'static str,
    },
    /// Malformed `Name[args]` text.
    Syntax {
        text: String,
        message: &'static str,
    },
    Declaration {
        name: String,
        error: ReifyError,
    },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::Parse(e) => write!(f, "invalid schema: {e}"),
            SchemaError::UnknownDeclaration { name } => {
                write!(f, "unknown declaration `{name}`")
            }
            SchemaError::MissingField {
                decl,
                member,
                field,
            } => write!(f, "member `{member}` of `{decl}` needs `{field}`"),
            SchemaError::Syntax { text, message } => write!(f, "{message} in `{text}`"),
            SchemaError::Declaration { name, error } => {
                write!(f, "cannot declare `{name}`: {error}")
            }
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchemaError::Parse(e) => Some(e),
            SchemaError::Declaration { error, .. } => Some(error),
            _ => None,
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Declarations registered from a schema, by name and in schema order.
#[derive(Clone, Debug, Default)]
pub struct LoadedSchema {
    names: FxHashMap<String, DeclId>,
    order: Vec<DeclId>,
}

impl LoadedSchema {
    pub fn get(&self, name: &str) -> Option<DeclId> {
        self.names.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<DeclId, SchemaError> {
        self.get(name).ok_or_else(|| SchemaError::UnknownDeclaration {
            name: name.to_string(),
        })
    }

    pub fn declarations(&self) -> &[DeclId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Resolve a value-context argument.
    pub fn value(&self, sys: &TypeSystem, arg: &ArgSpec) -> Result<Value, SchemaError> {
        match arg {
            ArgSpec::Name(name) => Ok(match self.get(name) {
                Some(decl) => Value::Decl(decl),
                None => sys.intrinsic(name),
            }),
            ArgSpec::Nested { decl, args } => {
                let decl = self.require(decl)?;
                let args = args
                    .iter()
                    .map(|a| self.value(sys, a))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::applied(decl, args))
            }
        }
    }

    /// Resolve a base argument; own parameter names become forwards.
    fn expr(
        &self,
        sys: &TypeSystem,
        own: &[ParamSpec],
        arg: &ArgSpec,
    ) -> Result<ArgExpr, SchemaError> {
        match arg {
            ArgSpec::Name(name) => match own.iter().position(|p| &p.name == name) {
                Some(index) => Ok(ArgExpr::Forward(index as u32)),
                None => Ok(ArgExpr::Concrete(self.value(sys, arg)?)),
            },
            ArgSpec::Nested { decl, args } => {
                let decl = self.require(decl)?;
                let args = args
                    .iter()
                    .map(|a| self.expr(sys, own, a))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ArgExpr::nested(decl, args))
            }
        }
    }

    /// Parse `Name` or `Name[arg, ...]` text into a value.
    pub fn parse_value(&self, sys: &TypeSystem, text: &str) -> Result<Value, SchemaError> {
        let spec = parse_arg_text(text)?;
        self.value(sys, &spec)
    }

    /// Parse a comma-separated argument list such as `int, List[str]`.
    pub fn parse_args(&self, sys: &TypeSystem, text: &str) -> Result<Vec<Value>, SchemaError> {
        split_top_level(text)?
            .into_iter()
            .map(|part| self.parse_value(sys, part))
            .collect()
    }
}

/// Register every declaration of `schema` in order.
pub fn load(sys: &TypeSystem, schema: &Schema) -> Result<LoadedSchema, SchemaError> {
    let mut loaded = LoadedSchema::default();
    for spec in &schema.declarations {
        let info = declaration_info(sys, &loaded, spec)?;
        let id = sys.declare(info).map_err(|error| SchemaError::Declaration {
            name: spec.name.clone(),
            error,
        })?;
        debug!(name = %spec.name, decl = id.0, "schema declaration registered");
        loaded.names.insert(spec.name.clone(), id);
        loaded.order.push(id);
    }
    Ok(loaded)
}

fn declaration_info(
    sys: &TypeSystem,
    loaded: &LoadedSchema,
    spec: &DeclSpec,
) -> Result<DeclarationInfo, SchemaError> {
    let mut params = Vec::with_capacity(spec.params.len());
    for p in &spec.params {
        let mut param = ParamInfo::new(sys.intern(&p.name));
        if let Some(default) = &p.default {
            param = param.with_default(loaded.value(sys, default)?);
        }
        if let Some(bound) = &p.bound {
            param = param.with_bound(loaded.value(sys, bound)?);
        }
        params.push(param);
    }

    let mut info = DeclarationInfo::generic(sys.intern(&spec.name), params);
    for b in &spec.bases {
        let decl = loaded.require(&b.decl)?;
        let args = b
            .args
            .iter()
            .map(|a| loaded.expr(sys, &spec.params, a))
            .collect::<Result<Vec<_>, _>>()?;
        info = info.with_base(BaseSpec::new(decl, args));
    }
    for m in &spec.members {
        info = info.with_member(sys.intern(&m.name), member(sys, loaded, spec, m)?);
    }
    if spec.foreign {
        info = info.foreign();
    }
    Ok(info)
}

fn member(
    sys: &TypeSystem,
    loaded: &LoadedSchema,
    decl: &DeclSpec,
    spec: &MemberSpec,
) -> Result<Member, SchemaError> {
    let missing = |field| SchemaError::MissingField {
        decl: decl.name.clone(),
        member: spec.name.clone(),
        field,
    };

    if spec.kind == MemberKind::Attribute {
        let value = spec.value.as_ref().ok_or_else(|| missing("value"))?;
        return Ok(Member::attribute(loaded.value(sys, value)?));
    }

    let action = spec.action.ok_or_else(|| missing("action"))?;
    let body: Box<dyn Fn(&CallContext<'_>, &[Value]) -> ReifyResult<Value> + Send + Sync> =
        match action {
            MemberAction::Receiver => Box::new(|ctx: &CallContext<'_>, _args: &[Value]| {
                Ok(ctx.receiver().to_value())
            }),
            MemberAction::Redirect => Box::new(|ctx: &CallContext<'_>, args: &[Value]| ctx.call_base(args)),
            MemberAction::Resolve => {
                let name = spec.ancestor.as_deref().ok_or_else(|| missing("ancestor"))?;
                let ancestor = loaded.require(name)?;
                Box::new(move |ctx: &CallContext<'_>, _args: &[Value]| {
                    resolved_value(ctx, ancestor)
                })
            }
        };

    Ok(match spec.kind {
        MemberKind::AliasAware => Member::alias_aware(move |ctx, args| body(ctx, args)),
        _ => Member::plain(move |ctx, args| body(ctx, args)),
    })
}

/// `ancestor[...]` with the receiver's view of each slot; unresolved slots
/// stay as placeholders.
fn resolved_value(ctx: &CallContext<'_>, ancestor: DeclId) -> ReifyResult<Value> {
    let resolved = ctx.resolve(ancestor)?;
    let args: Vec<Value> = resolved
        .iter()
        .enumerate()
        .map(|(index, v)| {
            v.clone()
                .unwrap_or(Value::Param(ParamRef::new(ancestor, index as u32)))
        })
        .collect();
    if args.is_empty() {
        return Ok(Value::Decl(ancestor));
    }
    Ok(Value::applied(ancestor, args))
}

// =============================================================================
// Argument text
// =============================================================================

fn parse_arg_text(text: &str) -> Result<ArgSpec, SchemaError> {
    let syntax = |message| SchemaError::Syntax {
        text: text.to_string(),
        message,
    };
    let text = text.trim();
    let Some(open) = text.find('[') else {
        if text.is_empty() || text.contains([']', ',']) {
            return Err(syntax("expected a name"));
        }
        return Ok(ArgSpec::Name(text.to_string()));
    };
    let Some(inner) = text[open + 1..].strip_suffix(']') else {
        return Err(syntax("unclosed `[`"));
    };
    let decl = text[..open].trim();
    if decl.is_empty() {
        return Err(syntax("expected a declaration name"));
    }
    let args = split_top_level(inner)?
        .into_iter()
        .map(parse_arg_text)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ArgSpec::Nested {
        decl: decl.to_string(),
        args,
    })
}

/// Split on commas outside brackets. Empty input yields no parts.
fn split_top_level(text: &str) -> Result<Vec<&str>, SchemaError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1).ok_or_else(|| SchemaError::Syntax {
                    text: text.to_string(),
                    message: "unbalanced `]`",
                })?;
            }
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(SchemaError::Syntax {
            text: text.to_string(),
            message: "unclosed `[`",
        });
    }
    parts.push(text[start..].trim());
    Ok(parts)
}

#[cfg(test)]
#[path = "tests/schema_text_tests.rs"]
mod tests;
