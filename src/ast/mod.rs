//! The abstract syntax tree shared by every pass.
//!
//! The tree is a family of typed nodes rather than one tagged node type.
//! Cross-references (a nominal type to its defining entity, a `use` to its
//! package) are arena indices into [`Program`], so passes can mutate nodes
//! in place without back-pointers.

pub mod builder;
pub mod checker;
pub mod expr;
pub mod id;
pub mod pretty;
pub mod types;

pub use expr::*;
pub use types::{Cap, Eph, Nominal, Type};

use std::collections::HashMap;

use crate::interner::Symbol;
use crate::pass::Pass;
use crate::source::{SourceId, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PackageId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EntityId(pub usize);

/// Identity of a local binding, assigned by the name pass and used by the
/// refer pass to track assignment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct LocalId(pub u32);

/// What a resolved name points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Def {
    Entity(EntityId),
    Method { entity: EntityId, index: usize },
    Field { entity: EntityId, index: usize },
    /// (is method-level, index into the owner's type parameter list).
    TypeParam { method: bool, index: usize },
    Param { index: usize },
    Local(LocalId),
    Package(PackageId),
}

/// Assignment/consume state tracked per symbol-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Status {
    Undefined,
    #[default]
    Defined,
    Consumed,
    /// Consumed inside a `try` body whose failure path may have run.
    ConsumedInTry,
    FfiDecl,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymEntry {
    pub def: Def,
    pub status: Status,
}

/// Name to definition mapping for one scope. Iteration follows insertion
/// order so diagnostics and signatures are stable.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: HashMap<Symbol, SymEntry>,
    order: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name; a duplicate comes back as `Err` with the existing entry.
    pub fn add(&mut self, name: Symbol, def: Def) -> Result<(), SymEntry> {
        if let Some(existing) = self.entries.get(&name) {
            return Err(*existing);
        }

        self.entries.insert(
            name,
            SymEntry {
                def,
                status: Status::Defined,
            },
        );
        self.order.push(name);
        Ok(())
    }

    pub fn add_with_status(&mut self, name: Symbol, def: Def, status: Status) -> Result<(), SymEntry> {
        self.add(name, def)?;
        self.set_status(name, status);
        Ok(())
    }

    pub fn get(&self, name: Symbol) -> Option<&SymEntry> {
        self.entries.get(&name)
    }

    pub fn set_status(&mut self, name: Symbol, status: Status) {
        if let Some(entry) = self.entries.get_mut(&name) {
            entry.status = status;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &SymEntry)> {
        self.order.iter().filter_map(|name| {
            self.entries.get(name).map(|entry| (*name, entry))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// The whole compilation: packages plus the flat entity arena they index.
#[derive(Debug, Default, serde::Serialize)]
pub struct Program {
    pub packages: Vec<Package>,
    pub entities: Vec<Entity>,
    /// The compilation unit.
    pub root: Option<PackageId>,
    /// The implicitly imported core package.
    pub builtin: Option<PackageId>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_package(&mut self, name: Symbol, path: String) -> PackageId {
        let id = PackageId(self.packages.len());
        self.packages.push(Package {
            id,
            name,
            path,
            modules: vec![],
            symbols: SymbolTable::new(),
            docstring: None,
        });
        id
    }

    pub fn add_entity(&mut self, entity: Entity) -> EntityId {
        let id = EntityId(self.entities.len());
        self.entities.push(entity);
        id
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }

    pub fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id.0]
    }

    pub fn package(&self, id: PackageId) -> &Package {
        &self.packages[id.0]
    }

    pub fn package_mut(&mut self, id: PackageId) -> &mut Package {
        &mut self.packages[id.0]
    }

    pub fn root_package(&self) -> Option<&Package> {
        self.root.map(|id| self.package(id))
    }

    pub fn find_package(&self, path: &str) -> Option<PackageId> {
        self.packages.iter().find(|p| p.path == path).map(|p| p.id)
    }

    /// Look an entity up by name inside one package.
    pub fn find_entity(&self, package: PackageId, name: Symbol) -> Option<EntityId> {
        match self.package(package).symbols.get(name)?.def {
            Def::Entity(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct Package {
    pub id: PackageId,
    pub name: Symbol,
    /// Canonical path, the key for deduplicating `use` targets.
    pub path: String,
    pub modules: Vec<Module>,
    /// Exported types of the package.
    #[serde(skip)]
    pub symbols: SymbolTable,
    pub docstring: Option<Symbol>,
}

#[derive(Debug, serde::Serialize)]
pub struct Module {
    pub source: SourceId,
    pub docstring: Option<Symbol>,
    pub uses: Vec<Use>,
    pub entities: Vec<EntityId>,
    /// Names visible in this module: its own types plus imports.
    #[serde(skip)]
    pub symbols: SymbolTable,
}

impl Module {
    pub fn new(source: SourceId) -> Self {
        Module {
            source,
            docstring: None,
            uses: vec![],
            entities: vec![],
            symbols: SymbolTable::new(),
        }
    }
}

/// A `use` directive.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Use {
    pub alias: Option<Symbol>,
    pub scheme: UseScheme,
    pub guard: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum UseScheme {
    Package {
        path: Symbol,
        package: Option<PackageId>,
    },
    Ffi(FfiDecl),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FfiDecl {
    pub name: Symbol,
    pub ret: Type,
    pub params: Vec<Param>,
    pub variadic: bool,
    pub partial: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EntityKind {
    Class,
    Actor,
    Primitive,
    Struct,
    Trait,
    Interface,
    Alias,
}

impl EntityKind {
    pub fn describe(&self) -> &'static str {
        match self {
            EntityKind::Class => "class",
            EntityKind::Actor => "actor",
            EntityKind::Primitive => "primitive",
            EntityKind::Struct => "struct",
            EntityKind::Trait => "trait",
            EntityKind::Interface => "interface",
            EntityKind::Alias => "type alias",
        }
    }

    /// Abstract entities provide method signatures without instances.
    pub fn is_abstract(&self) -> bool {
        matches!(self, EntityKind::Trait | EntityKind::Interface)
    }

    pub fn is_concrete(&self) -> bool {
        matches!(
            self,
            EntityKind::Class | EntityKind::Actor | EntityKind::Primitive | EntityKind::Struct
        )
    }
}

/// A top-level type declaration.
#[derive(Debug, serde::Serialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub name: Symbol,
    pub package: PackageId,
    pub type_params: Vec<TypeParam>,
    pub default_cap: Option<Cap>,
    pub provides: Vec<Type>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    /// For `type A is B`: the aliased type.
    pub alias_of: Option<Type>,
    #[serde(skip)]
    pub symbols: SymbolTable,
    pub annotations: Vec<Symbol>,
    pub docstring: Option<Symbol>,
    pub span: Span,
    /// Last pass that has finished with this entity. Entities synthesized
    /// by sugar start behind and are caught up via `pass_through`.
    pub pass_reached: Pass,
}

impl Entity {
    pub fn new(kind: EntityKind, name: Symbol, package: PackageId, span: Span) -> Self {
        Entity {
            kind,
            name,
            package,
            type_params: vec![],
            default_cap: None,
            provides: vec![],
            fields: vec![],
            methods: vec![],
            alias_of: None,
            symbols: SymbolTable::new(),
            annotations: vec![],
            docstring: None,
            span,
            pass_reached: Pass::Parse,
        }
    }

    pub fn find_method(&self, name: Symbol) -> Option<(usize, &Method)> {
        self.methods
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name)
    }

    pub fn find_field(&self, name: Symbol) -> Option<(usize, &Field)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FieldKind {
    Var,
    Let,
    Embed,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Field {
    pub kind: FieldKind,
    pub name: Symbol,
    pub ty: Type,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MethodKind {
    Constructor,
    Behaviour,
    Function,
}

impl MethodKind {
    pub fn describe(&self) -> &'static str {
        match self {
            MethodKind::Constructor => "constructor",
            MethodKind::Behaviour => "behaviour",
            MethodKind::Function => "function",
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Method {
    pub kind: MethodKind,
    pub cap: Option<Cap>,
    pub name: Symbol,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub ret: Option<Type>,
    pub partial: bool,
    pub body: Option<Expr>,
    /// Case-method guard, merged away by the sugar pass.
    pub guard: Option<Expr>,
    pub annotations: Vec<Symbol>,
    pub docstring: Option<Symbol>,
    pub span: Span,
    /// Set when the body was inherited through the provides list.
    pub inherited_from: Option<EntityId>,
}

impl Method {
    pub fn new(kind: MethodKind, name: Symbol, span: Span) -> Self {
        Method {
            kind,
            cap: None,
            name,
            type_params: vec![],
            params: vec![],
            ret: None,
            partial: false,
            body: None,
            guard: None,
            annotations: vec![],
            docstring: None,
            span,
            inherited_from: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Param {
    pub name: Symbol,
    pub ty: Type,
    pub default: Option<Expr>,
    /// Case-method value pattern in place of a plain parameter; merged away
    /// by the sugar pass.
    pub pattern: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TypeParam {
    pub name: Symbol,
    pub constraint: Option<Type>,
    pub default: Option<Type>,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::Interner;

    #[test]
    fn test_symbol_table_duplicates() {
        let mut interner = Interner::new();
        let foo = interner.intern("foo");

        let mut table = SymbolTable::new();
        assert!(table.add(foo, Def::Param { index: 0 }).is_ok());

        let clash = table.add(foo, Def::Param { index: 1 });
        assert_eq!(
            clash.unwrap_err().def,
            Def::Param { index: 0 },
            "the original entry survives"
        );
    }

    #[test]
    fn test_symbol_table_order_is_insertion_order() {
        let mut interner = Interner::new();
        let b = interner.intern("b");
        let a = interner.intern("a");

        let mut table = SymbolTable::new();
        table.add(b, Def::Param { index: 0 }).unwrap();
        table.add(a, Def::Param { index: 1 }).unwrap();

        let names: Vec<_> = table.names().collect();
        assert_eq!(names, vec![b, a]);
    }

    #[test]
    fn test_program_arena() {
        let mut interner = Interner::new();
        let mut program = Program::new();

        let pkg = program.add_package(interner.intern("main"), "main".into());
        let name = interner.intern("Foo");
        let id = program.add_entity(Entity::new(EntityKind::Class, name, pkg, Span::default()));

        program
            .package_mut(pkg)
            .symbols
            .add(name, Def::Entity(id))
            .unwrap();

        assert_eq!(program.find_entity(pkg, name), Some(id));
        assert_eq!(program.entity(id).kind, EntityKind::Class);
    }
}
