//! The refer pass tracks definite assignment and consume state for locals,
//! parameters, fields of `this`, and `this` itself, across control flow.
//!
//! States form a small lattice; joins take the meet, so a name consumed on
//! any path into a point is consumed at that point.

use std::collections::HashMap;

use crate::ast::expr::*;
use crate::ast::{Def, EntityId, FieldKind, LocalId, MethodKind, Program};
use crate::interner::Symbol;
use crate::reporter::{DiagnosticKind, Reporter};
use crate::source::Span;

use super::{Context, PassResult};

pub fn run(program: &mut Program, ctx: &mut Context) -> PassResult {
    for index in 0..program.entities.len() {
        entity(program, ctx, EntityId(index));
    }

    PassResult::Ok
}

pub fn entity(program: &mut Program, ctx: &mut Context, id: EntityId) -> PassResult {
    for index in 0..program.entity(id).methods.len() {
        let entity = program.entity(id);
        let method = &entity.methods[index];

        if method.inherited_from.is_some() {
            continue;
        }
        let Some(body) = &method.body else {
            continue;
        };

        let mut walker = Refer {
            program,
            reporter: &mut ctx.session.reporter,
            interner: &ctx.session.interner,
            entity: id,
            states: HashMap::new(),
            local_names: HashMap::new(),
            local_kinds: HashMap::new(),
            consume_target: None,
            in_loop_cond: false,
            loop_entry_keys: vec![],
            break_states: vec![],
            quiet: false,
        };

        // Fields start undefined in a constructor and defined elsewhere;
        // `this` and the parameters are always defined on entry.
        let in_constructor = method.kind == MethodKind::Constructor;
        for field_index in 0..entity.fields.len() {
            let state = if in_constructor {
                NameState::Undefined
            } else {
                NameState::Defined
            };
            walker.states.insert(Key::Field(field_index), state);
        }
        walker.states.insert(Key::This, NameState::Defined);
        for param_index in 0..method.params.len() {
            walker
                .states
                .insert(Key::Param(param_index), NameState::Defined);
        }

        walker.walk(body);

        if in_constructor {
            for (field_index, field) in entity.fields.iter().enumerate() {
                if walker.states.get(&Key::Field(field_index)) != Some(&NameState::Defined) {
                    let message = format!(
                        "field '{}' is not initialised by this constructor",
                        walker.interner.get(field.name)
                    );
                    walker
                        .reporter
                        .error(DiagnosticKind::Semantic, field.span, message);
                }
            }
        }
    }

    PassResult::Ok
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Key {
    Local(LocalId),
    Param(usize),
    Field(usize),
    This,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameState {
    Undefined,
    Defined,
    Consumed,
    ConsumedInTry,
}

impl NameState {
    fn rank(self) -> u8 {
        match self {
            NameState::Defined => 3,
            NameState::Undefined => 2,
            NameState::Consumed => 1,
            NameState::ConsumedInTry => 0,
        }
    }

    /// The meet: the worse of the two states survives a join point.
    fn meet(self, other: NameState) -> NameState {
        if self.rank() <= other.rank() {
            self
        } else {
            other
        }
    }
}

type States = HashMap<Key, NameState>;

struct Refer<'a> {
    program: &'a Program,
    reporter: &'a mut Reporter,
    interner: &'a crate::interner::Interner,
    entity: EntityId,
    states: States,
    local_names: HashMap<LocalId, Symbol>,
    local_kinds: HashMap<LocalId, LocalKind>,
    /// The field being assigned by the enclosing assignment, making a
    /// same-expression field consume legal.
    consume_target: Option<Key>,
    in_loop_cond: bool,
    /// Keys that existed when the innermost loop was entered.
    loop_entry_keys: Vec<Vec<Key>>,
    /// Per enclosing loop, the meet of the states observed at each of its
    /// `break`s. A consume right before a break leaves the loop in that
    /// state, so it must poison the post-loop state.
    break_states: Vec<Option<States>>,
    quiet: bool,
}

impl<'a> Refer<'a> {
    fn error(&mut self, span: Span, message: String) {
        if !self.quiet {
            self.reporter
                .error(DiagnosticKind::Semantic, span, message);
        }
    }

    fn key_name(&self, key: Key) -> String {
        match key {
            Key::Local(id) => self
                .local_names
                .get(&id)
                .map(|s| self.interner.get(*s).to_string())
                .unwrap_or_else(|| "local".to_string()),
            Key::Param(_) => "parameter".to_string(),
            Key::Field(index) => {
                let entity = self.program.entity(self.entity);
                entity
                    .fields
                    .get(index)
                    .map(|f| self.interner.get(f.name).to_string())
                    .unwrap_or_else(|| "field".to_string())
            }
            Key::This => "this".to_string(),
        }
    }

    fn key_for(&self, expr: &Expr) -> Option<Key> {
        match &expr.kind {
            ExprKind::Reference { def, .. } => match def {
                Some(Def::Local(id)) => Some(Key::Local(*id)),
                Some(Def::Param { index }) => Some(Key::Param(*index)),
                Some(Def::Field { entity, index }) if *entity == self.entity => {
                    Some(Key::Field(*index))
                }
                _ => None,
            },
            ExprKind::This => Some(Key::This),
            ExprKind::Dot { expr: inner, member } => {
                // A field of this, accessed explicitly.
                if matches!(inner.kind, ExprKind::This) {
                    let entity = self.program.entity(self.entity);
                    entity.find_field(*member).map(|(i, _)| Key::Field(i))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn read(&mut self, key: Key, span: Span) {
        match self.states.get(&key).copied() {
            None | Some(NameState::Defined) => {}
            Some(NameState::Undefined) => {
                let name = self.key_name(key);
                self.error(span, format!("'{name}' is used before a value is assigned"));
            }
            Some(NameState::Consumed) => {
                let name = self.key_name(key);
                self.error(span, format!("'{name}' cannot be used after it is consumed"));
            }
            Some(NameState::ConsumedInTry) => {
                let name = self.key_name(key);
                self.error(
                    span,
                    format!("'{name}' may have been consumed in the failed try body"),
                );
            }
        }
    }

    fn define(&mut self, key: Key) {
        self.states.insert(key, NameState::Defined);
    }

    fn walk(&mut self, expr: &Expr) {
        let span = expr.span;

        match &expr.kind {
            ExprKind::Seq(exprs) => {
                for e in exprs {
                    self.walk(e);
                }
            }
            ExprKind::Reference { .. } => {
                if let Some(key) = self.key_for(expr) {
                    self.read(key, span);
                    if matches!(key, Key::Field(_)) {
                        self.read(Key::This, span);
                    }
                }
            }
            ExprKind::This => self.read(Key::This, span),
            ExprKind::Local { id, .. } => {
                if let Some(id) = id {
                    self.note_local(expr, *id);
                    self.states.insert(Key::Local(*id), NameState::Undefined);
                }
            }
            ExprKind::MatchCapture { id, .. } => {
                if let Some(id) = id {
                    self.note_local(expr, *id);
                    self.states.insert(Key::Local(*id), NameState::Defined);
                }
            }
            ExprKind::Consume { expr: inner } => self.walk_consume(inner, span),
            ExprKind::Assign { lhs, rhs } => self.walk_assign(lhs, rhs, span),
            ExprKind::Dot { expr: inner, .. } => {
                if let Some(key) = self.key_for(expr) {
                    // A field read through an explicit this.
                    self.read(Key::This, span);
                    self.read(key, span);
                } else {
                    self.walk(inner);
                }
            }
            ExprKind::Qualify { expr: inner, .. } => self.walk(inner),
            ExprKind::Call(call) => {
                self.walk(&call.receiver);
                for arg in &call.positional {
                    self.walk(arg);
                }
                for (_, arg) in &call.named {
                    self.walk(arg);
                }
            }
            ExprKind::FfiCall { args, .. } => {
                for arg in args {
                    self.walk(arg);
                }
            }
            ExprKind::Tuple(exprs) | ExprKind::Array { elems: exprs, .. } => {
                for e in exprs {
                    self.walk(e);
                }
            }
            ExprKind::Binop { lhs, rhs, .. } => {
                self.walk(lhs);
                self.walk(rhs);
            }
            ExprKind::If(node) | ExprKind::IfDef(node) => {
                self.walk(&node.cond);

                let entry = self.states.clone();
                self.walk(&node.then_body);
                let then_exit = std::mem::replace(&mut self.states, entry.clone());

                match &node.else_body {
                    Some(else_body) => {
                        self.walk(else_body);
                        let else_exit = std::mem::take(&mut self.states);
                        self.states = merge(then_exit, else_exit);
                    }
                    None => {
                        self.states = merge(then_exit, entry);
                    }
                }
            }
            ExprKind::IfType(node) => {
                let entry = self.states.clone();
                self.walk(&node.then_body);
                let then_exit = std::mem::replace(&mut self.states, entry.clone());

                match &node.else_body {
                    Some(else_body) => {
                        self.walk(else_body);
                        let else_exit = std::mem::take(&mut self.states);
                        self.states = merge(then_exit, else_exit);
                    }
                    None => {
                        self.states = merge(then_exit, entry);
                    }
                }
            }
            ExprKind::While(node) => {
                self.walk_loop(Some(&node.cond), &node.body, node.else_body.as_ref(), false);
            }
            ExprKind::Repeat(node) => {
                self.walk_loop(Some(&node.cond), &node.body, node.else_body.as_ref(), true);
            }
            ExprKind::Match(node) => {
                self.walk(&node.scrutinee);

                let entry = self.states.clone();
                let mut exits: Vec<States> = vec![];

                for case in &node.cases {
                    self.states = entry.clone();
                    self.walk(&case.pattern);
                    if let Some(guard) = &case.guard {
                        self.walk(guard);
                    }
                    if let Some(body) = &case.body {
                        self.walk(body);
                    }
                    exits.push(std::mem::take(&mut self.states));
                }

                self.states = entry.clone();
                if let Some(else_body) = &node.else_body {
                    self.walk(else_body);
                }
                exits.push(std::mem::take(&mut self.states));

                self.states = exits
                    .into_iter()
                    .reduce(merge)
                    .unwrap_or(entry);
            }
            ExprKind::Try {
                body,
                else_body,
                then_body,
                ..
            } => {
                let entry = self.states.clone();

                self.walk(body);
                let body_exit = self.states.clone();

                // On the failure path, anything consumed inside the body
                // may or may not have happened.
                let mut else_entry = entry.clone();
                for (key, state) in &body_exit {
                    if matches!(state, NameState::Consumed | NameState::ConsumedInTry) {
                        let was = entry.get(key).copied().unwrap_or(NameState::Defined);
                        if was == NameState::Defined {
                            else_entry.insert(*key, NameState::ConsumedInTry);
                        }
                    }
                }

                let merged = match else_body {
                    Some(else_body) => {
                        self.states = else_entry;
                        self.walk(else_body);
                        let else_exit = std::mem::take(&mut self.states);
                        merge(body_exit, else_exit)
                    }
                    None => merge(body_exit, else_entry),
                };

                self.states = merged;
                if let Some(then_body) = then_body {
                    self.walk(then_body);
                }
            }
            ExprKind::Recover { body, .. } => self.walk(body),
            ExprKind::Break(value) => {
                if let Some(value) = value {
                    self.walk(value);
                }
                self.record_break();
                self.after_jump();
            }
            ExprKind::Continue => self.after_jump(),
            ExprKind::Return(value) => {
                if let Some(value) = value {
                    self.walk(value);
                }
                self.after_jump();
            }
            ExprKind::ErrorExpr => self.after_jump(),
            ExprKind::IntLit(_)
            | ExprKind::FloatLit(_)
            | ExprKind::StringLit(_)
            | ExprKind::BoolLit(_)
            | ExprKind::CompileIntrinsic
            | ExprKind::Object { .. }
            | ExprKind::Lambda(_)
            | ExprKind::For(_)
            | ExprKind::With(_)
            | ExprKind::As { .. }
            | ExprKind::Unop { .. }
            | ExprKind::Loc => {}
        }
    }

    fn note_local(&mut self, expr: &Expr, id: LocalId) {
        match &expr.kind {
            ExprKind::Local { kind, name, .. } => {
                self.local_names.insert(id, *name);
                self.local_kinds.insert(id, *kind);
            }
            ExprKind::MatchCapture { name, .. } => {
                self.local_names.insert(id, *name);
                self.local_kinds.insert(id, LocalKind::Let);
            }
            _ => {}
        }
    }

    /// Control has left; nothing after this point in the sequence runs, so
    /// every name reads as defined to avoid cascading errors.
    fn after_jump(&mut self) {
        for state in self.states.values_mut() {
            *state = NameState::Defined;
        }
    }

    /// Snapshot the states a `break` carries out of its innermost loop,
    /// meet-merged across all of that loop's breaks. Taken before
    /// `after_jump` wipes the unreachable tail.
    fn record_break(&mut self) {
        if let Some(slot) = self.break_states.last_mut() {
            let snapshot = self.states.clone();
            *slot = Some(match slot.take() {
                Some(existing) => merge(existing, snapshot),
                None => snapshot,
            });
        }
    }

    fn walk_consume(&mut self, inner: &Expr, span: Span) {
        match &inner.kind {
            ExprKind::This => {
                self.read(Key::This, span);
                self.states.insert(Key::This, NameState::Consumed);
            }
            _ => {
                let Some(key) = self.key_for(inner) else {
                    // The expr pass reports the bad operand.
                    return;
                };

                if self.in_loop_cond && self.key_from_outside_loop(key) {
                    let name = self.key_name(key);
                    self.error(
                        span,
                        format!("a loop condition cannot consume '{name}' from outside the loop"),
                    );
                    return;
                }

                if let Key::Field(index) = key {
                    let field = &self.program.entity(self.entity).fields[index];
                    if field.kind != FieldKind::Var {
                        let name = self.key_name(key);
                        self.error(span, format!("cannot consume let or embed field '{name}'"));
                        return;
                    }

                    if self.consume_target != Some(key) {
                        let name = self.key_name(key);
                        self.error(
                            span,
                            format!(
                                "consuming field '{name}' requires reassigning it in the same expression"
                            ),
                        );
                        return;
                    }
                }

                self.read(key, span);
                self.states.insert(key, NameState::Consumed);
            }
        }
    }

    fn walk_assign(&mut self, lhs: &Expr, rhs: &Expr, span: Span) {
        // A same-expression field consume is legal when this assignment
        // reassigns that very field.
        let target = self.assign_target(lhs);
        let saved = self.consume_target;
        if let Some(Key::Field(_)) = target {
            self.consume_target = target;
        }
        self.walk(rhs);
        self.consume_target = saved;

        match &lhs.kind {
            ExprKind::Local { id, .. } => {
                if let Some(id) = id {
                    self.note_local(lhs, *id);
                    self.define(Key::Local(*id));
                }
            }
            ExprKind::Tuple(elems) => {
                for elem in elems {
                    let elem = unwrap_seq(elem);
                    if let ExprKind::Local { id: Some(id), .. } = &elem.kind {
                        self.note_local(elem, *id);
                        self.define(Key::Local(*id));
                    }
                }
            }
            ExprKind::Reference { .. } | ExprKind::Dot { .. } | ExprKind::This => {
                match target {
                    Some(Key::Local(id)) => {
                        let already = self.states.get(&Key::Local(id)).copied();
                        if self.local_kinds.get(&id) == Some(&LocalKind::Let)
                            && already == Some(NameState::Defined)
                        {
                            let name = self.key_name(Key::Local(id));
                            self.error(span, format!("cannot reassign the let local '{name}'"));
                        }
                        self.define(Key::Local(id));
                    }
                    Some(key) => {
                        if matches!(key, Key::Field(_)) {
                            self.read(Key::This, span);
                        }
                        self.define(key);
                    }
                    None => {
                        // Assignment through an arbitrary expression; the
                        // expr pass checks it.
                        if let ExprKind::Dot { expr: inner, .. } = &lhs.kind {
                            self.walk(inner);
                        }
                    }
                }
            }
            _ => self.walk(lhs),
        }
    }

    fn assign_target(&self, lhs: &Expr) -> Option<Key> {
        match &lhs.kind {
            ExprKind::Reference { .. } | ExprKind::Dot { .. } => self.key_for(lhs),
            _ => None,
        }
    }

    fn key_from_outside_loop(&self, key: Key) -> bool {
        self.loop_entry_keys
            .last()
            .map(|keys| keys.contains(&key))
            .unwrap_or(false)
    }

    /// Loops run their body an unknown number of times: the body is first
    /// probed from the entry state, then re-checked from the merged state
    /// so loop-carried consumes surface.
    fn walk_loop(
        &mut self,
        cond: Option<&Expr>,
        body: &Expr,
        else_body: Option<&Expr>,
        cond_after_body: bool,
    ) {
        let entry = self.states.clone();
        self.loop_entry_keys.push(entry.keys().copied().collect());

        // Quiet first pass to find the loop-carried state. Its break
        // snapshots are discarded along with its errors.
        self.break_states.push(None);
        self.quiet = true;
        if let (Some(cond), false) = (cond, cond_after_body) {
            self.walk_cond(cond);
        }
        self.walk(body);
        if let (Some(cond), true) = (cond, cond_after_body) {
            self.walk_cond(cond);
        }
        self.quiet = false;
        self.break_states.pop();

        let first_exit = std::mem::take(&mut self.states);
        self.states = merge(entry.clone(), first_exit);

        // Real pass from the merged state.
        self.break_states.push(None);
        if let (Some(cond), false) = (cond, cond_after_body) {
            self.walk_cond(cond);
        }
        self.walk(body);
        if let (Some(cond), true) = (cond, cond_after_body) {
            self.walk_cond(cond);
        }
        let breaks = self.break_states.pop().flatten();

        self.loop_entry_keys.pop();

        let body_exit = self.states.clone();

        // The loop may not run at all; the else arm sees the entry state.
        self.states = entry.clone();
        if let Some(else_body) = else_body {
            self.walk(else_body);
        }
        let else_exit = std::mem::take(&mut self.states);

        // The state after the loop is the meet of every way out of it:
        // normal body exit, zero iterations or the else arm, and whatever
        // each break carried. A name consumed right before a break stays
        // consumed here, so using it after the loop is rejected.
        let mut after = merge(body_exit, merge(entry, else_exit));
        if let Some(breaks) = breaks {
            after = merge(after, breaks);
        }
        self.states = after;
    }

    fn walk_cond(&mut self, cond: &Expr) {
        let saved = self.in_loop_cond;
        self.in_loop_cond = true;
        self.walk(cond);
        self.in_loop_cond = saved;
    }
}

fn unwrap_seq(expr: &Expr) -> &Expr {
    match &expr.kind {
        ExprKind::Seq(exprs) if exprs.len() == 1 => &exprs[0],
        _ => expr,
    }
}

fn merge(mut left: States, right: States) -> States {
    for (key, state) in right {
        left.entry(key)
            .and_modify(|s| *s = s.meet(state))
            .or_insert(state);
    }
    left
}
