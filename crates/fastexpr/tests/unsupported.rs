//! The fallback contract: anything outside the supported subset compiles to
//! `None`, with no partial effects, so callers can hand the tree to their
//! general evaluator.

use fastexpr::{
    compile, BinOp, ClassBuilder, CmpOp, CtorBody, CtorId, Expr, LambdaExpr, MemberBinding,
    MemberRef, NewExpr, ParamExpr, Registry, Ty, UnaryOp, Value,
};

#[test]
fn arithmetic_is_outside_the_subset() {
    // (x: int) => x + 1
    let registry = Registry::new();
    let x = ParamExpr::new("x", Ty::Int);
    let lambda = LambdaExpr::new(
        vec![x.clone()],
        Expr::Binary {
            op: BinOp::Add,
            left: Box::new(Expr::param(&x)),
            right: Box::new(Expr::int(1)),
        },
        Ty::Int,
    );
    assert!(compile(&registry, &lambda).is_none());
}

#[test]
fn unary_operators_are_outside_the_subset() {
    let registry = Registry::new();
    let x = ParamExpr::new("x", Ty::Bool);
    let lambda = LambdaExpr::new(
        vec![x.clone()],
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(Expr::param(&x)),
        },
        Ty::Bool,
    );
    assert!(compile(&registry, &lambda).is_none());
}

#[test]
fn unsupported_nodes_anywhere_in_the_tree_reject_the_compile() {
    // Supported root, unsupported operand.
    let registry = Registry::new();
    let x = ParamExpr::new("x", Ty::Int);
    let lambda = LambdaExpr::new(
        vec![x.clone()],
        Expr::compare(
            CmpOp::Eq,
            Expr::Binary {
                op: BinOp::Mul,
                left: Box::new(Expr::param(&x)),
                right: Box::new(Expr::int(2)),
            },
            Expr::int(4),
        ),
        Ty::Bool,
    );
    assert!(compile(&registry, &lambda).is_none());
}

#[test]
fn convert_to_the_universal_reference_type_is_rejected() {
    // (s: string) => (object)s
    let registry = Registry::new();
    let s = ParamExpr::new("s", Ty::Str);
    let lambda = LambdaExpr::new(
        vec![s.clone()],
        Expr::Convert {
            operand: Box::new(Expr::param(&s)),
            ty: Ty::Object,
        },
        Ty::Object,
    );
    assert!(compile(&registry, &lambda).is_none());
}

#[test]
fn non_assignment_member_bindings_are_rejected() {
    let mut registry = Registry::new();
    let class = registry.add_class(
        ClassBuilder::new("Bag")
            .auto_property("Items", Ty::array_of(Ty::Int))
            .ctor(Vec::new(), CtorBody::FieldInit),
    );
    let member = MemberRef::Property { class, prop: 0 };
    for binding in [
        MemberBinding::Nested {
            member,
            bindings: Vec::new(),
        },
        MemberBinding::List {
            member,
            items: Vec::new(),
        },
    ] {
        let lambda = LambdaExpr::new(
            Vec::new(),
            Expr::MemberInit {
                new: NewExpr {
                    ctor: CtorId { class, index: 0 },
                    args: Vec::new(),
                },
                bindings: vec![binding],
            },
            Ty::Class(class),
        );
        assert!(compile(&registry, &lambda).is_none());
    }
}

#[test]
fn property_without_a_getter_rejects_access() {
    let mut registry = Registry::new();
    let class = registry.add_class(
        ClassBuilder::new("WriteOnly")
            .setter_property("Secret", Ty::Str)
            .ctor(Vec::new(), CtorBody::FieldInit),
    );
    let p = ParamExpr::new("p", Ty::Class(class));
    let lambda = LambdaExpr::new(
        vec![p.clone()],
        Expr::Member {
            object: Some(Box::new(Expr::param(&p))),
            member: MemberRef::Property { class, prop: 0 },
        },
        Ty::Str,
    );
    assert!(compile(&registry, &lambda).is_none());
}

#[test]
fn property_without_a_setter_rejects_member_init() {
    let mut registry = Registry::new();
    let class = registry.add_class(
        ClassBuilder::new("ReadOnly")
            .getter_property("Id", Ty::Int)
            .ctor(Vec::new(), CtorBody::FieldInit),
    );
    let lambda = LambdaExpr::new(
        Vec::new(),
        Expr::MemberInit {
            new: NewExpr {
                ctor: CtorId { class, index: 0 },
                args: Vec::new(),
            },
            bindings: vec![MemberBinding::Assign {
                member: MemberRef::Property { class, prop: 0 },
                value: Expr::int(1),
            }],
        },
        Ty::Class(class),
    );
    assert!(compile(&registry, &lambda).is_none());
}

#[test]
fn unsupported_nested_lambda_rejects_the_outer_compile() {
    // () => ((x: int) => x + 1): the nested body is unsupported, and the
    // failure propagates to the top-level compile.
    let registry = Registry::new();
    let x = ParamExpr::new("x", Ty::Int);
    let inner = LambdaExpr::new(
        vec![x.clone()],
        Expr::Binary {
            op: BinOp::Add,
            left: Box::new(Expr::param(&x)),
            right: Box::new(Expr::int(1)),
        },
        Ty::Int,
    );
    let outer = LambdaExpr::new(Vec::new(), Expr::Lambda(inner.clone()), inner.fn_ty());
    assert!(compile(&registry, &outer).is_none());
}

#[test]
fn rejection_leaves_the_tree_reusable() {
    // A rejected compile mutates nothing: the same nodes compile fine in a
    // supported tree afterwards.
    let registry = Registry::new();
    let x = ParamExpr::new("x", Ty::Int);
    let bad = LambdaExpr::new(
        vec![x.clone()],
        Expr::Binary {
            op: BinOp::Add,
            left: Box::new(Expr::param(&x)),
            right: Box::new(Expr::param(&x)),
        },
        Ty::Int,
    );
    assert!(compile(&registry, &bad).is_none());

    let good = LambdaExpr::new(
        vec![x.clone()],
        Expr::compare(CmpOp::Eq, Expr::param(&x), Expr::param(&x)),
        Ty::Bool,
    );
    let f = compile(&registry, &good).expect("supported");
    assert_eq!(f.invoke(&registry, &[Value::Int(1)]).unwrap().as_bool(), Some(true));
}
