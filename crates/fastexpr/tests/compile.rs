//! End-to-end compiles of the supported node kinds, checked by invoking the
//! produced callables.

use std::rc::Rc;

use fastexpr::{
    compile, compile_body, ClassBuilder, CmpOp, CtorBody, CtorId, Expr, Instance, LambdaExpr,
    MemberBinding, MemberRef, MethodId, NewExpr, ParamExpr, Registry, RuntimeError, Ty, Value,
};

#[test]
fn constant_body_returns_the_constant() {
    // () => 42
    let registry = Registry::new();
    let lambda = LambdaExpr::new(Vec::new(), Expr::int(42), Ty::Int);
    let f = compile(&registry, &lambda).expect("supported");
    assert_eq!(f.invoke(&registry, &[]).unwrap().as_int(), Some(42));
    // No closure allocated for an inline constant.
    assert!(f.target().is_none());
}

#[test]
fn parameter_comparison() {
    // (x: int) => x == 1
    let registry = Registry::new();
    let x = ParamExpr::new("x", Ty::Int);
    let lambda = LambdaExpr::new(
        vec![x.clone()],
        Expr::compare(CmpOp::Eq, Expr::param(&x), Expr::int(1)),
        Ty::Bool,
    );
    let f = compile(&registry, &lambda).expect("supported");
    assert_eq!(f.invoke(&registry, &[Value::Int(1)]).unwrap().as_bool(), Some(true));
    assert_eq!(f.invoke(&registry, &[Value::Int(2)]).unwrap().as_bool(), Some(false));
    assert!(f.target().is_none());
}

#[test]
fn all_six_comparisons() {
    let registry = Registry::new();
    let a = ParamExpr::new("a", Ty::Int);
    let b = ParamExpr::new("b", Ty::Int);
    let cases = [
        (CmpOp::Eq, [false, true, false]),
        (CmpOp::Ne, [true, false, true]),
        (CmpOp::Lt, [true, false, false]),
        (CmpOp::Le, [true, true, false]),
        (CmpOp::Gt, [false, false, true]),
        (CmpOp::Ge, [false, true, true]),
    ];
    for (op, expected) in cases {
        let lambda = LambdaExpr::new(
            vec![a.clone(), b.clone()],
            Expr::compare(op, Expr::param(&a), Expr::param(&b)),
            Ty::Bool,
        );
        let f = compile(&registry, &lambda).expect("supported");
        // (1,2): a < b; (2,2): a == b; (3,2): a > b.
        for (args, want) in [(1, 2), (2, 2), (3, 2)].iter().zip(expected) {
            let got = f
                .invoke(&registry, &[Value::Int(args.0), Value::Int(args.1)])
                .unwrap();
            assert_eq!(got.as_bool(), Some(want), "{op:?} on {args:?}");
        }
    }
}

#[test]
fn double_comparison() {
    let registry = Registry::new();
    let x = ParamExpr::new("x", Ty::Double);
    let lambda = LambdaExpr::new(
        vec![x.clone()],
        Expr::compare(
            CmpOp::Lt,
            Expr::param(&x),
            Expr::constant(Value::Double(1.5), Ty::Double),
        ),
        Ty::Bool,
    );
    let f = compile(&registry, &lambda).expect("supported");
    assert_eq!(f.invoke(&registry, &[Value::Double(1.0)]).unwrap().as_bool(), Some(true));
    assert_eq!(f.invoke(&registry, &[Value::Double(2.0)]).unwrap().as_bool(), Some(false));
}

#[test]
fn array_initializer_builds_fresh_arrays() {
    // () => new int[] { 1, 2, 3 }
    let registry = Registry::new();
    let lambda = LambdaExpr::new(
        Vec::new(),
        Expr::NewArrayInit {
            elem: Ty::Int,
            items: vec![Expr::int(1), Expr::int(2), Expr::int(3)],
        },
        Ty::array_of(Ty::Int),
    );
    let f = compile(&registry, &lambda).expect("supported");

    let first = f.invoke(&registry, &[]).unwrap();
    let arr = first.as_array().expect("array result");
    let items: Vec<i64> = arr.to_vec().iter().map(|v| v.as_int().unwrap()).collect();
    assert_eq!(items, [1, 2, 3]);

    // Each invocation allocates a fresh array.
    let second = f.invoke(&registry, &[]).unwrap();
    assert!(!first.cmp_eq(&second));
}

#[test]
fn array_index_reads_reference_elements() {
    // (xs: string[], i: int) => xs[i]
    let registry = Registry::new();
    let xs = ParamExpr::new("xs", Ty::array_of(Ty::Str));
    let i = ParamExpr::new("i", Ty::Int);
    let lambda = LambdaExpr::new(
        vec![xs.clone(), i.clone()],
        Expr::ArrayIndex {
            array: Box::new(Expr::param(&xs)),
            index: Box::new(Expr::param(&i)),
        },
        Ty::Str,
    );
    let f = compile(&registry, &lambda).expect("supported");

    let arr = Value::Array(Rc::new(fastexpr::ArrayObj::new(
        Ty::Str,
        vec![Value::str("a"), Value::str("b")],
    )));
    let got = f.invoke(&registry, &[arr.clone(), Value::Int(1)]).unwrap();
    assert_eq!(got.as_str(), Some("b"));

    let err = f.invoke(&registry, &[arr, Value::Int(5)]).unwrap_err();
    assert!(matches!(err, RuntimeError::IndexOutOfRange { .. }));
}

#[test]
fn member_init_assigns_properties() {
    // (a, b) => new Pair { First = a, Second = b }
    let mut registry = Registry::new();
    let pair = registry.add_class(
        ClassBuilder::new("Pair")
            .auto_property("First", Ty::Str)
            .auto_property("Second", Ty::Str)
            .ctor(Vec::new(), CtorBody::FieldInit),
    );
    let a = ParamExpr::new("a", Ty::Str);
    let b = ParamExpr::new("b", Ty::Str);
    let lambda = LambdaExpr::new(
        vec![a.clone(), b.clone()],
        Expr::MemberInit {
            new: NewExpr {
                ctor: CtorId { class: pair, index: 0 },
                args: Vec::new(),
            },
            bindings: vec![
                MemberBinding::Assign {
                    member: MemberRef::Property { class: pair, prop: 0 },
                    value: Expr::param(&a),
                },
                MemberBinding::Assign {
                    member: MemberRef::Property { class: pair, prop: 1 },
                    value: Expr::param(&b),
                },
            ],
        },
        Ty::Class(pair),
    );
    let f = compile(&registry, &lambda).expect("supported");

    let got = f
        .invoke(&registry, &[Value::str("x"), Value::str("y")])
        .unwrap();
    let inst = got.as_obj().expect("object result");
    assert_eq!(inst.class(), pair);
    assert_eq!(inst.field(0).as_str(), Some("x"));
    assert_eq!(inst.field(1).as_str(), Some("y"));
}

#[test]
fn constructor_arguments_initialize_fields() {
    // (name: string) => new Holder(name)
    let mut registry = Registry::new();
    let holder = registry.add_class(
        ClassBuilder::new("Holder")
            .field("name", Ty::Str)
            .ctor(vec![Ty::Str], CtorBody::FieldInit),
    );
    let name = ParamExpr::new("name", Ty::Str);
    let lambda = LambdaExpr::new(
        vec![name.clone()],
        Expr::New(NewExpr {
            ctor: CtorId { class: holder, index: 0 },
            args: vec![Expr::param(&name)],
        }),
        Ty::Class(holder),
    );
    let f = compile(&registry, &lambda).expect("supported");
    let got = f.invoke(&registry, &[Value::str("n")]).unwrap();
    assert_eq!(got.as_obj().unwrap().field(0).as_str(), Some("n"));
}

#[test]
fn static_method_call() {
    // (a: int, b: int) => IntOps.Max(a, b)
    let mut registry = Registry::new();
    let ops = registry.add_class(ClassBuilder::new("IntOps").method(
        "Max",
        true,
        false,
        vec![Ty::Int, Ty::Int],
        Ty::Int,
        |_, args| {
            let (a, b) = (args[0].as_int().unwrap(), args[1].as_int().unwrap());
            Ok(Value::Int(a.max(b)))
        },
    ));
    let a = ParamExpr::new("a", Ty::Int);
    let b = ParamExpr::new("b", Ty::Int);
    let lambda = LambdaExpr::new(
        vec![a.clone(), b.clone()],
        Expr::Call {
            receiver: None,
            method: MethodId { class: ops, index: 0 },
            args: vec![Expr::param(&a), Expr::param(&b)],
        },
        Ty::Int,
    );
    let f = compile(&registry, &lambda).expect("supported");
    let got = f
        .invoke(&registry, &[Value::Int(3), Value::Int(9)])
        .unwrap();
    assert_eq!(got.as_int(), Some(9));
}

#[test]
fn virtual_method_call_dispatches_on_receiver() {
    // (c: Counter) => c.Next()
    let mut registry = Registry::new();
    let counter = registry.add_class(
        ClassBuilder::new("Counter")
            .field("value", Ty::Int)
            .ctor(vec![Ty::Int], CtorBody::FieldInit)
            .method("Next", false, true, Vec::new(), Ty::Int, |_, args| {
                let inst = args[0].as_obj().unwrap();
                let next = inst.field(0).as_int().unwrap() + 1;
                inst.set_field(0, Value::Int(next));
                Ok(Value::Int(next))
            }),
    );
    let c = ParamExpr::new("c", Ty::Class(counter));
    let lambda = LambdaExpr::new(
        vec![c.clone()],
        Expr::Call {
            receiver: Some(Box::new(Expr::param(&c))),
            method: MethodId { class: counter, index: 0 },
            args: Vec::new(),
        },
        Ty::Int,
    );
    let f = compile(&registry, &lambda).expect("supported");

    let obj = Value::Obj(Rc::new(Instance::new(counter, vec![Value::Int(10)])));
    assert_eq!(f.invoke(&registry, &[obj.clone()]).unwrap().as_int(), Some(11));
    assert_eq!(f.invoke(&registry, &[obj]).unwrap().as_int(), Some(12));

    // Virtual call null-checks the receiver.
    let err = f.invoke(&registry, &[Value::Null]).unwrap_err();
    assert!(matches!(err, RuntimeError::NullReference));
}

#[test]
fn property_getter_access() {
    // (p: Pair) => p.First
    let mut registry = Registry::new();
    let pair = registry.add_class(
        ClassBuilder::new("Pair")
            .auto_property("First", Ty::Str)
            .ctor(Vec::new(), CtorBody::FieldInit),
    );
    let p = ParamExpr::new("p", Ty::Class(pair));
    let lambda = LambdaExpr::new(
        vec![p.clone()],
        Expr::Member {
            object: Some(Box::new(Expr::param(&p))),
            member: MemberRef::Property { class: pair, prop: 0 },
        },
        Ty::Str,
    );
    let f = compile(&registry, &lambda).expect("supported");
    let obj = Value::Obj(Rc::new(Instance::new(pair, vec![Value::str("hello")])));
    assert_eq!(f.invoke(&registry, &[obj]).unwrap().as_str(), Some("hello"));
}

#[test]
fn static_field_access() {
    // () => Settings.Origin
    let mut registry = Registry::new();
    let settings = registry.add_class(ClassBuilder::new("Settings").static_field(
        "Origin",
        Ty::Str,
        Value::str("zero"),
    ));
    let lambda = LambdaExpr::new(
        Vec::new(),
        Expr::Member {
            object: None,
            member: MemberRef::StaticField { class: settings, field: 0 },
        },
        Ty::Str,
    );
    let f = compile(&registry, &lambda).expect("supported");
    assert_eq!(f.invoke(&registry, &[]).unwrap().as_str(), Some("zero"));
}

#[test]
fn invoke_calls_a_delegate_parameter() {
    // (f: int -> int, x: int) => f(x)
    let registry = Registry::new();
    let y = ParamExpr::new("y", Ty::Int);
    let identity = compile(
        &registry,
        &LambdaExpr::new(vec![y.clone()], Expr::param(&y), Ty::Int),
    )
    .expect("identity compiles");

    let f_param = ParamExpr::new("f", Ty::fn_of(vec![Ty::Int], Ty::Int));
    let x = ParamExpr::new("x", Ty::Int);
    let lambda = LambdaExpr::new(
        vec![f_param.clone(), x.clone()],
        Expr::Invoke {
            target: Box::new(Expr::param(&f_param)),
            args: vec![Expr::param(&x)],
        },
        Ty::Int,
    );
    let outer = compile(&registry, &lambda).expect("supported");
    let got = outer
        .invoke(&registry, &[Value::Fn(identity), Value::Int(3)])
        .unwrap();
    assert_eq!(got.as_int(), Some(3));
}

#[test]
fn convert_casts_object_back_to_class() {
    // () => ((Holder)boxed).name, where boxed is an Object-typed constant
    let mut registry = Registry::new();
    let holder = registry.add_class(
        ClassBuilder::new("Holder")
            .field("name", Ty::Str)
            .ctor(vec![Ty::Str], CtorBody::FieldInit),
    );
    let obj = Value::Obj(Rc::new(Instance::new(holder, vec![Value::str("hi")])));
    let lambda = LambdaExpr::new(
        Vec::new(),
        Expr::Member {
            object: Some(Box::new(Expr::Convert {
                operand: Box::new(Expr::constant(obj, Ty::Object)),
                ty: Ty::Class(holder),
            })),
            member: MemberRef::Field { class: holder, field: 0 },
        },
        Ty::Str,
    );
    let f = compile(&registry, &lambda).expect("supported");
    assert_eq!(f.invoke(&registry, &[]).unwrap().as_str(), Some("hi"));
}

#[test]
fn failed_cast_faults_the_invocation() {
    // (o: object) => (string)o, invoked with a non-string
    let registry = Registry::new();
    let o = ParamExpr::new("o", Ty::Object);
    let lambda = LambdaExpr::new(
        vec![o.clone()],
        Expr::Convert {
            operand: Box::new(Expr::param(&o)),
            ty: Ty::Str,
        },
        Ty::Str,
    );
    let f = compile(&registry, &lambda).expect("supported");
    assert_eq!(
        f.invoke(&registry, &[Value::str("ok")]).unwrap().as_str(),
        Some("ok")
    );
    let err = f.invoke(&registry, &[Value::Int(1)]).unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidCast { .. }));
}

#[test]
fn enum_constants_encode_inline() {
    // (c: Color) => c == Color.Green
    let mut registry = Registry::new();
    let color = registry.add_class(ClassBuilder::new("Color"));
    let c = ParamExpr::new("c", Ty::Enum(color));
    let lambda = LambdaExpr::new(
        vec![c.clone()],
        Expr::compare(
            CmpOp::Eq,
            Expr::param(&c),
            Expr::constant(Value::Enum(color, 2), Ty::Enum(color)),
        ),
        Ty::Bool,
    );
    let f = compile(&registry, &lambda).expect("supported");
    assert!(f.target().is_none(), "enum constants need no closure slot");
    let got = f.invoke(&registry, &[Value::Enum(color, 2)]).unwrap();
    assert_eq!(got.as_bool(), Some(true));
    let got = f.invoke(&registry, &[Value::Enum(color, 1)]).unwrap();
    assert_eq!(got.as_bool(), Some(false));
}

#[test]
fn compile_body_is_the_low_level_entry() {
    let registry = Registry::new();
    let x = ParamExpr::new("x", Ty::Int);
    let body = Expr::compare(CmpOp::Ge, Expr::param(&x), Expr::int(0));
    let f = compile_body(&registry, &body, &[x], &Ty::Bool).expect("supported");
    assert_eq!(f.invoke(&registry, &[Value::Int(0)]).unwrap().as_bool(), Some(true));
    assert_eq!(f.invoke(&registry, &[Value::Int(-3)]).unwrap().as_bool(), Some(false));
}

#[test]
fn invoke_checks_arity() {
    let registry = Registry::new();
    let x = ParamExpr::new("x", Ty::Int);
    let lambda = LambdaExpr::new(vec![x.clone()], Expr::param(&x), Ty::Int);
    let f = compile(&registry, &lambda).expect("supported");
    let err = f.invoke(&registry, &[]).unwrap_err();
    assert!(matches!(err, RuntimeError::ArityMismatch { expected: 1, given: 0 }));
}

#[test]
fn recompiling_the_same_tree_is_idempotent() {
    let registry = Registry::new();
    let x = ParamExpr::new("x", Ty::Int);
    let lambda = LambdaExpr::new(
        vec![x.clone()],
        Expr::compare(CmpOp::Lt, Expr::param(&x), Expr::int(7)),
        Ty::Bool,
    );
    let f1 = compile(&registry, &lambda).expect("supported");
    let f2 = compile(&registry, &lambda).expect("supported");
    for v in [-1, 6, 7, 8] {
        let a = f1.invoke(&registry, &[Value::Int(v)]).unwrap();
        let b = f2.invoke(&registry, &[Value::Int(v)]).unwrap();
        assert!(a.cmp_eq(&b), "diverged at {v}");
    }
}
