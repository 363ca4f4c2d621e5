//! Input lowering: typed source fragments and the coercions between them.

use super::{js_string, number_literal, CodeGenerator};
use crate::error::CompileResult;
use crate::ir::constant::{number_to_string, Constant};
use crate::ir::input::{BinaryOp, CastKind, Input, InputKind, UnaryOp};
use crate::lattice::ValueType;

/// A lowered expression: a source fragment plus the lattice type of the
/// values it evaluates to. The type decides which coercions the consumers
/// still have to apply.
#[derive(Clone, Debug)]
pub(crate) struct Js {
    pub source: String,
    pub ty: ValueType,
}

impl Js {
    fn new(source: String, ty: ValueType) -> Js {
        Js { source, ty }
    }

    fn unknown(source: String) -> Js {
        Js::new(source, ValueType::ANY)
    }
}

impl<'a> CodeGenerator<'a> {
    /// Lowers an input tree to a typed fragment.
    pub(crate) fn descend_input(&mut self, input: &Input) -> CompileResult<Js> {
        match &input.kind {
            InputKind::Constant(c) => Ok(self.descend_constant(c)),
            InputKind::VarGet(var) => {
                let binding = self.variable_binding(var);
                Ok(Js::new(format!("{}.value", binding), input.ty))
            }
            InputKind::ListGet { list, index } => self.descend_list_get(list, index),
            InputKind::ListLength { list } => {
                let l = self.list_binding(list);
                Ok(Js::new(format!("{}.value.length", l), input.ty))
            }
            InputKind::ListContains { list, item } => {
                let l = self.list_binding(list);
                let item = self.descend_input(item)?;
                Ok(Js::new(
                    format!("listContains({}.value, {})", l, item.source),
                    ValueType::BOOLEAN,
                ))
            }
            InputKind::ListIndexOf { list, item } => {
                let l = self.list_binding(list);
                let item = self.descend_input(item)?;
                Ok(Js::new(
                    format!("listIndexOf({}.value, {})", l, item.source),
                    input.ty,
                ))
            }
            InputKind::ListContents { list } => {
                let l = self.list_binding(list);
                Ok(Js::new(format!("listContents({}.value)", l), input.ty))
            }
            InputKind::ProcedureArgStringNumber { index, .. } => {
                Ok(Js::new(format!("p{}", index), ValueType::ANY))
            }
            InputKind::ProcedureArgBoolean { index, .. } => {
                Ok(Js::new(format!("p{}", index), ValueType::BOOLEAN))
            }
            InputKind::Cast { kind, value } => {
                let inner = self.descend_input(value)?;
                let source = match kind {
                    CastKind::Boolean => self.as_boolean(&inner),
                    CastKind::Number => self.as_number(&inner),
                    CastKind::NumberOrNan => self.as_number_or_nan(&inner),
                    CastKind::NumberIndex => self.as_number_index(&inner),
                    CastKind::String => self.as_string(&inner),
                };
                Ok(Js::new(source, input.ty))
            }
            InputKind::Binary { op, left, right } => self.descend_binary(*op, left, right, input.ty),
            InputKind::Unary { op, value } => self.descend_unary(*op, value, input.ty),
            InputKind::MotionX => Ok(Js::new("limitPrecision(target.x)".into(), input.ty)),
            InputKind::MotionY => Ok(Js::new("limitPrecision(target.y)".into(), input.ty)),
            InputKind::MotionDirection => Ok(Js::new("target.direction".into(), input.ty)),
            InputKind::LooksSize => Ok(Js::new("target.size".into(), input.ty)),
            InputKind::LooksCostumeNumber => {
                Ok(Js::new("(target.currentCostume + 1)".into(), input.ty))
            }
            InputKind::LooksCostumeName => Ok(Js::new(
                "target.getCostumes()[target.currentCostume].name".into(),
                input.ty,
            )),
            InputKind::SensingTimer => Ok(Js::new(
                "runtime.ioDevices.clock.projectTimer()".into(),
                input.ty,
            )),
            InputKind::SensingMouseX => Ok(Js::new(
                "runtime.ioDevices.mouse.getScratchX()".into(),
                input.ty,
            )),
            InputKind::SensingMouseY => Ok(Js::new(
                "runtime.ioDevices.mouse.getScratchY()".into(),
                input.ty,
            )),
            InputKind::SensingMouseDown => Ok(Js::new(
                "runtime.ioDevices.mouse.getIsDown()".into(),
                ValueType::BOOLEAN,
            )),
            InputKind::SensingKeyDown { key } => {
                let key = self.descend_input(key)?;
                Ok(Js::new(
                    format!("runtime.ioDevices.keyboard.getKeyIsDown({})", key.source),
                    ValueType::BOOLEAN,
                ))
            }
            InputKind::SensingDaysSince2000 => Ok(Js::new("daysSince2000()".into(), input.ty)),
            InputKind::SensingUsername => Ok(Js::new(
                "runtime.ioDevices.userData.getUsername()".into(),
                input.ty,
            )),
            InputKind::SensingDistanceTo { object } => {
                let object = self.descend_input(object)?;
                let name = self.as_string(&object);
                Ok(Js::new(format!("distance({})", name), input.ty))
            }
            InputKind::SensingTouching { object } => {
                let object = self.descend_input(object)?;
                Ok(Js::new(
                    format!("target.isTouchingObject({})", object.source),
                    ValueType::BOOLEAN,
                ))
            }
            InputKind::SensingOf { property, object } => self.descend_sensing_of(property, object),
            InputKind::CompatibilityLayer {
                opcode,
                inputs,
                fields,
            } => self.descend_compat_input(opcode, inputs, fields),
        }
    }

    fn descend_constant(&mut self, c: &Constant) -> Js {
        match c {
            Constant::Number(n) => Js::new(number_literal(*n), c.value_type()),
            Constant::Boolean(b) => Js::new(b.to_string(), ValueType::BOOLEAN),
            Constant::String(s) => Js::new(js_string(s), c.value_type()),
        }
    }

    fn descend_list_get(&mut self, list: &crate::ir::ListRef, index: &Input) -> CompileResult<Js> {
        let l = self.list_binding(list);
        if self.ctx.config.supports_nullish_coalescing
            && index.is_constant(&Constant::String("last".into()))
        {
            return Ok(Js::unknown(format!(
                "({}.value[{}.value.length - 1] ?? \"\")",
                l, l
            )));
        }
        let idx = self.descend_input(index)?;
        if self.ctx.config.supports_nullish_coalescing
            && idx.ty.is_always(ValueType::NUMBER_OR_NAN)
        {
            let idx = self.as_number_index(&idx);
            return Ok(Js::unknown(format!("({}.value[{} - 1] ?? \"\")", l, idx)));
        }
        Ok(Js::unknown(format!(
            "listGet({}.value, {})",
            l, idx.source
        )))
    }

    fn descend_binary(
        &mut self,
        op: BinaryOp,
        left: &Input,
        right: &Input,
        ty: ValueType,
    ) -> CompileResult<Js> {
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                let l = self.descend_to_number(left)?;
                let r = self.descend_to_number(right)?;
                let operator = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    _ => "/",
                };
                Ok(Js::new(format!("({} {} {})", l, operator, r), ty))
            }
            BinaryOp::Mod => {
                self.descended_into_modulo = true;
                let l = self.descend_to_number(left)?;
                let r = self.descend_to_number(right)?;
                Ok(Js::new(format!("mod({}, {})", l, r), ty))
            }
            BinaryOp::And | BinaryOp::Or => {
                let l = self.descend_to_boolean(left)?;
                let r = self.descend_to_boolean(right)?;
                let operator = if op == BinaryOp::And { "&&" } else { "||" };
                Ok(Js::new(
                    format!("({} {} {})", l, operator, r),
                    ValueType::BOOLEAN,
                ))
            }
            BinaryOp::Eq => self.descend_equals(left, right),
            BinaryOp::Lt => self.descend_ordering(left, right, "<", "compareLessThan"),
            BinaryOp::Gt => self.descend_ordering(left, right, ">", "compareGreaterThan"),
            BinaryOp::Join => {
                let l = self.descend_input(left)?;
                let r = self.descend_input(right)?;
                let l = self.as_string(&l);
                let r = self.as_string(&r);
                Ok(Js::new(format!("({} + {})", l, r), ty))
            }
            BinaryOp::LetterOf => {
                let s = self.descend_input(left)?;
                let s = self.as_string(&s);
                let i = self.descend_input(right)?;
                let i = self.as_number_index(&i);
                Ok(Js::new(format!("(({})[{} - 1] || \"\")", s, i), ty))
            }
            BinaryOp::Contains => {
                let l = self.descend_input(left)?;
                let r = self.descend_input(right)?;
                let l = self.as_string(&l);
                let r = self.as_string(&r);
                Ok(Js::new(
                    format!("({}.toLowerCase().indexOf({}.toLowerCase()) !== -1)", l, r),
                    ValueType::BOOLEAN,
                ))
            }
            BinaryOp::Random => self.descend_random(left, right, ty),
        }
    }

    fn descend_unary(&mut self, op: UnaryOp, value: &Input, ty: ValueType) -> CompileResult<Js> {
        if op == UnaryOp::Not {
            let v = self.descend_to_boolean(value)?;
            return Ok(Js::new(format!("!{}", v), ValueType::BOOLEAN));
        }
        if op == UnaryOp::Len {
            let v = self.descend_input(value)?;
            let v = self.as_string(&v);
            return Ok(Js::new(format!("{}.length", v), ty));
        }
        let v = self.descend_to_number(value)?;
        let source = match op {
            UnaryOp::Abs => format!("Math.abs({})", v),
            UnaryOp::Floor => format!("Math.floor({})", v),
            UnaryOp::Ceil => format!("Math.ceil({})", v),
            UnaryOp::Sqrt => format!("Math.sqrt({})", v),
            UnaryOp::Round => format!("Math.round({})", v),
            UnaryOp::Sin => format!("(Math.round(Math.sin((Math.PI * {}) / 180) * 1e10) / 1e10)", v),
            UnaryOp::Cos => format!("(Math.round(Math.cos((Math.PI * {}) / 180) * 1e10) / 1e10)", v),
            UnaryOp::Tan => format!("tan({})", v),
            UnaryOp::Asin => format!("((Math.asin({}) * 180) / Math.PI)", v),
            UnaryOp::Acos => format!("((Math.acos({}) * 180) / Math.PI)", v),
            UnaryOp::Atan => format!("((Math.atan({}) * 180) / Math.PI)", v),
            UnaryOp::Ln => format!("Math.log({})", v),
            UnaryOp::Log10 => format!("(Math.log({}) / Math.LN10)", v),
            UnaryOp::PowE => format!("Math.exp({})", v),
            UnaryOp::Pow10 => format!("Math.pow(10, {})", v),
            UnaryOp::Not | UnaryOp::Len => unreachable!("handled above"),
        };
        Ok(Js::new(source, ty))
    }

    /// Equality, specialized by what the analyzer knows about both sides.
    fn descend_equals(&mut self, left: &Input, right: &Input) -> CompileResult<Js> {
        let l = self.descend_input(left)?;
        let r = self.descend_input(right)?;

        // Both sides certainly numeric: identity on numeric coercions.
        if l.ty.is_always(ValueType::NUMBER) && r.ty.is_always(ValueType::NUMBER) {
            let l = self.as_number(&l);
            let r = self.as_number(&r);
            return Ok(Js::new(format!("({} === {})", l, r), ValueType::BOOLEAN));
        }
        // A side that can never read as a number forces the string path at
        // runtime, whatever the other side is.
        if never_numeric(l.ty) || never_numeric(r.ty) {
            let l = self.as_lowercase_string(left, &l);
            let r = self.as_lowercase_string(right, &r);
            return Ok(Js::new(format!("({} === {})", l, r), ValueType::BOOLEAN));
        }
        // One side a safe numeric constant: the comparison collapses to a
        // numeric identity check regardless of the other side's type,
        // because a non-zero comparand can never collide with the 0 that
        // non-numeric values coerce to.
        if let Some(n) = self.safe_equals_constant(left) {
            let r = self.as_number(&r);
            return Ok(Js::new(
                format!("({} === {})", number_literal(n), r),
                ValueType::BOOLEAN,
            ));
        }
        if let Some(n) = self.safe_equals_constant(right) {
            let l = self.as_number(&l);
            return Ok(Js::new(
                format!("({} === {})", l, number_literal(n)),
                ValueType::BOOLEAN,
            ));
        }
        Ok(Js::new(
            format!("compareEqual({}, {})", l.source, r.source),
            ValueType::BOOLEAN,
        ))
    }

    fn descend_ordering(
        &mut self,
        left: &Input,
        right: &Input,
        operator: &str,
        helper: &str,
    ) -> CompileResult<Js> {
        let l = self.descend_input(left)?;
        let r = self.descend_input(right)?;
        if l.ty.is_always(ValueType::NUMBER) && r.ty.is_always(ValueType::NUMBER) {
            let l = self.as_number(&l);
            let r = self.as_number(&r);
            return Ok(Js::new(
                format!("({} {} {})", l, operator, r),
                ValueType::BOOLEAN,
            ));
        }
        if never_numeric(l.ty) || never_numeric(r.ty) {
            let l = self.as_lowercase_string(left, &l);
            let r = self.as_lowercase_string(right, &r);
            return Ok(Js::new(
                format!("({} {} {})", l, operator, r),
                ValueType::BOOLEAN,
            ));
        }
        Ok(Js::new(
            format!("{}({}, {})", helper, l.source, r.source),
            ValueType::BOOLEAN,
        ))
    }

    /// A constant that may stand in for its numeric coercion inside an
    /// equality: non-zero, not NaN, stringifies back to the original
    /// literal, and does not collide with a costume or sound name.
    fn safe_equals_constant(&self, input: &Input) -> Option<f64> {
        let c = input.as_constant()?;
        let n = c.to_number_or_nan();
        if n == 0.0 || n.is_nan() {
            return None;
        }
        let original = c.to_display_string();
        if number_to_string(n) != original {
            return None;
        }
        if self.target.is_unsafe_name(&original) {
            return None;
        }
        Some(n)
    }

    /// Lowercased string form of a side; constants fold at compile time.
    fn as_lowercase_string(&mut self, input: &Input, js: &Js) -> String {
        if let Some(c) = input.as_constant() {
            return js_string(&c.to_display_string().to_lowercase());
        }
        format!("{}.toLowerCase()", self.as_string(js))
    }

    fn descend_random(&mut self, left: &Input, right: &Input, ty: ValueType) -> CompileResult<Js> {
        if let (Some(a), Some(b)) = (left.as_constant(), right.as_constant()) {
            let (x, y) = (a.to_number(), b.to_number());
            let helper = if x.fract() == 0.0 && y.fract() == 0.0 {
                "randomInt"
            } else {
                "randomFloat"
            };
            return Ok(Js::new(
                format!("{}({}, {})", helper, number_literal(x), number_literal(y)),
                ty,
            ));
        }
        let fract_constant = |input: &Input| {
            input
                .as_constant()
                .map(|c| c.to_number().fract() != 0.0)
                .unwrap_or(false)
        };
        let l = self.descend_to_number(left)?;
        let r = self.descend_to_number(right)?;
        if fract_constant(left) || fract_constant(right) {
            return Ok(Js::new(format!("randomFloat({}, {})", l, r), ty));
        }
        // Whether the bounds are integral is only known at runtime; defer to
        // the operators extension.
        let ops = self.setup.bind("runtime.ext_scratch3_operators");
        Ok(Js::new(format!("{}._random({}, {})", ops, l, r), ty))
    }

    fn descend_sensing_of(&mut self, property: &str, object: &Input) -> CompileResult<Js> {
        if object.is_constant(&Constant::String("_stage_".into())) {
            return Ok(Js::unknown(property_read("stage", property)));
        }
        if let Some(Constant::String(name)) = object.as_constant() {
            let binding = self
                .setup
                .bind(&format!("runtime.getSpriteTargetByName({})", js_string(name)));
            return Ok(Js::unknown(property_read(&binding, property)));
        }
        let object = self.descend_input(object)?;
        let name = self.as_string(&object);
        let scratch = self.target_scratch();
        Ok(Js::unknown(format!(
            "(({} = runtime.getSpriteTargetByName({})), {} ? {} : 0)",
            scratch,
            name,
            scratch,
            property_read(&scratch, property)
        )))
    }

    fn descend_compat_input(
        &mut self,
        opcode: &str,
        inputs: &[(String, Input)],
        fields: &[(String, String)],
    ) -> CompileResult<Js> {
        self.mark_yield()?;
        let function = self
            .setup
            .bind(&format!("runtime.getOpcodeFunction({})", js_string(opcode)));
        let inputs = self.object_literal(inputs)?;
        let fields = field_literal(fields);
        Ok(Js::unknown(format!(
            "(yield* executeInCompatibilityLayer({}, {}, {}, {}))",
            inputs, fields, function, self.script.is_warp
        )))
    }

    /// `{ "NAME": <expr>, ... }` for compatibility-layer inputs.
    pub(crate) fn object_literal(&mut self, entries: &[(String, Input)]) -> CompileResult<String> {
        let mut parts = Vec::with_capacity(entries.len());
        for (name, input) in entries {
            let value = self.descend_input(input)?;
            parts.push(format!("{}: {}", js_string(name), value.source));
        }
        Ok(format!("{{ {} }}", parts.join(", ")))
    }

    // ========== Coercions ==========

    /// Numeric coercion with NaN mapped to 0 and -0 preserved.
    pub(crate) fn as_number(&mut self, js: &Js) -> String {
        if js.ty.is_always(ValueType::NUMBER) {
            return js.source.clone();
        }
        if js.ty.is_always(ValueType::NUMBER_OR_NAN) {
            if !js.ty.is_sometimes(ValueType::NAN) {
                return js.source.clone();
            }
            if !js.ty.is_sometimes(ValueType::NEG_ZERO) {
                // `||` folds NaN to 0 and cannot hit -0 here.
                return format!("({} || 0)", js.source);
            }
            let scratch = self.number_scratch();
            return format!(
                "(({} = {}), {} === {} ? {} : 0)",
                scratch, js.source, scratch, scratch, scratch
            );
        }
        // Full coercion. The bound local avoids evaluating the operand
        // twice while keeping -0 and mapping NaN to 0.
        let scratch = self.number_scratch();
        format!(
            "(({} = +{}), {} === {} ? {} : 0)",
            scratch, js.source, scratch, scratch, scratch
        )
    }

    /// Lossless numeric coercion; may produce NaN.
    pub(crate) fn as_number_or_nan(&self, js: &Js) -> String {
        if js.ty.is_always(ValueType::NUMBER_OR_NAN) {
            js.source.clone()
        } else {
            format!("(+{})", js.source)
        }
    }

    /// Numeric coercion truncated toward zero, for 1-based indices.
    pub(crate) fn as_number_index(&self, js: &Js) -> String {
        if js
            .ty
            .is_always(ValueType::NUMBER_OR_NAN.without(ValueType::FRACT))
        {
            js.source.clone()
        } else {
            format!("Math.trunc({})", self.as_number_or_nan(js))
        }
    }

    /// String coercion.
    pub(crate) fn as_string(&self, js: &Js) -> String {
        if js.ty.is_always(ValueType::ANY_STRING) {
            js.source.clone()
        } else {
            format!("(\"\" + {})", js.source)
        }
    }

    /// Boolean coercion through the host truthiness helper.
    pub(crate) fn as_boolean(&self, js: &Js) -> String {
        if js.ty.is_always(ValueType::BOOLEAN) {
            js.source.clone()
        } else {
            format!("toBoolean({})", js.source)
        }
    }

    pub(crate) fn descend_to_number(&mut self, input: &Input) -> CompileResult<String> {
        let js = self.descend_input(input)?;
        Ok(self.as_number(&js))
    }

    pub(crate) fn descend_to_boolean(&mut self, input: &Input) -> CompileResult<String> {
        let js = self.descend_input(input)?;
        Ok(self.as_boolean(&js))
    }

    pub(crate) fn descend_to_string(&mut self, input: &Input) -> CompileResult<String> {
        let js = self.descend_input(input)?;
        Ok(self.as_string(&js))
    }
}

/// True when no value of this type reads as a number under comparison:
/// numbers, numeric strings and booleans all do.
fn never_numeric(ty: ValueType) -> bool {
    !ty.is_sometimes(ValueType::NUMBER_OR_NAN | ValueType::STRING_NUM | ValueType::BOOLEAN)
}

/// Source for reading one property of another target.
fn property_read(target: &str, property: &str) -> String {
    match property {
        "volume" => format!("{}.volume", target),
        "x position" => format!("{}.x", target),
        "y position" => format!("{}.y", target),
        "direction" => format!("{}.direction", target),
        "costume #" | "backdrop #" => format!("({}.currentCostume + 1)", target),
        "costume name" | "backdrop name" => {
            format!("{}.getCostumes()[{}.currentCostume].name", target, target)
        }
        "size" => format!("{}.size", target),
        _ => format!(
            "(({}.lookupVariableByNameAndType({}, \"\") || {{ value: 0 }}).value)",
            target,
            js_string(property)
        ),
    }
}

/// `{ "NAME": "value", ... }` for compatibility-layer fields.
fn field_literal(fields: &[(String, String)]) -> String {
    let parts: Vec<String> = fields
        .iter()
        .map(|(name, value)| format!("{}: {}", js_string(name), js_string(value)))
        .collect();
    format!("{{ {} }}", parts.join(", "))
}
