//! Shared CFG fixtures for the integration tests

#![allow(dead_code)]

use zir_ir::{BinaryOp, BlockId, Function, IrBuilder, IrType, ValueId};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `entry -> {then, else} -> merge`, with `merge` holding `phi [then: 1, else: 2]`
pub struct IfElse {
    pub func: Function,
    pub entry: BlockId,
    pub then_bb: BlockId,
    pub else_bb: BlockId,
    pub merge: BlockId,
    pub one: ValueId,
    pub two: ValueId,
    pub phi: ValueId,
}

pub fn if_else() -> IfElse {
    let mut builder = IrBuilder::new();
    builder.create_function("select", IrType::I32);
    let entry = builder.create_block("entry").unwrap();
    let then_bb = builder.create_block("then").unwrap();
    let else_bb = builder.create_block("else").unwrap();
    let merge = builder.create_block("merge").unwrap();

    builder.position_at_end(entry).unwrap();
    let cond = builder.build_bool(true).unwrap();
    builder.build_branch(cond, then_bb, else_bb).unwrap();

    builder.position_at_end(then_bb).unwrap();
    let one = builder.build_int(1, IrType::I32).unwrap();
    builder.build_jump(merge).unwrap();

    builder.position_at_end(else_bb).unwrap();
    let two = builder.build_int(2, IrType::I32).unwrap();
    builder.build_jump(merge).unwrap();

    builder.position_at_end(merge).unwrap();
    let phi = builder.build_phi(merge, IrType::I32, &[then_bb, else_bb], &[one, two]).unwrap();
    builder.build_return(Some(phi)).unwrap();

    IfElse {
        func: builder.finish_function().unwrap(),
        entry,
        then_bb,
        else_bb,
        merge,
        one,
        two,
        phi,
    }
}

/// `entry -> header -> {body -> header, exit}` counting `i` from 0 to 10
pub struct WhileLoop {
    pub func: Function,
    pub entry: BlockId,
    pub header: BlockId,
    pub body: BlockId,
    pub exit: BlockId,
    pub phi: ValueId,
    pub next: ValueId,
}

pub fn while_loop() -> WhileLoop {
    let mut builder = IrBuilder::new();
    builder.create_function("count", IrType::I32);
    let entry = builder.create_block("entry").unwrap();
    let header = builder.create_block("header").unwrap();
    let body = builder.create_block("body").unwrap();
    let exit = builder.create_block("exit").unwrap();

    builder.position_at_end(entry).unwrap();
    let zero = builder.build_int(0, IrType::I32).unwrap();
    builder.build_jump(header).unwrap();

    builder.position_at_end(header).unwrap();
    let phi = builder.build_phi(header, IrType::I32, &[entry], &[zero]).unwrap();
    let ten = builder.build_int(10, IrType::I32).unwrap();
    let cond = builder.build_binary(BinaryOp::Lt, phi, ten).unwrap();
    builder.build_branch(cond, body, exit).unwrap();

    builder.position_at_end(body).unwrap();
    let one = builder.build_int(1, IrType::I32).unwrap();
    let next = builder.build_binary(BinaryOp::Add, phi, one).unwrap();
    builder.build_jump(header).unwrap();
    builder.add_phi_incoming(phi, body, next).unwrap();

    builder.position_at_end(exit).unwrap();
    builder.build_return(Some(phi)).unwrap();

    WhileLoop {
        func: builder.finish_function().unwrap(),
        entry,
        header,
        body,
        exit,
        phi,
        next,
    }
}

/// `entry -> t1 -> ... -> tN -> target`, every `t` a lone jump
pub struct TrampolineChain {
    pub func: Function,
    pub entry: BlockId,
    pub trampolines: Vec<BlockId>,
    pub target: BlockId,
}

pub fn trampoline_chain(len: usize) -> TrampolineChain {
    let mut builder = IrBuilder::new();
    builder.create_function("hops", IrType::Void);
    let entry = builder.create_block("entry").unwrap();
    let trampolines: Vec<BlockId> = (1..=len)
        .map(|i| builder.create_block(format!("t{i}")).unwrap())
        .collect();
    let target = builder.create_block("target").unwrap();

    let mut from = entry;
    for &next in trampolines.iter().chain(std::iter::once(&target)) {
        builder.position_at_end(from).unwrap();
        builder.build_jump(next).unwrap();
        from = next;
    }
    builder.position_at_end(target).unwrap();
    builder.build_return(None).unwrap();

    TrampolineChain {
        func: builder.finish_function().unwrap(),
        entry,
        trampolines,
        target,
    }
}
