// arcadia_core/src/runtime/thread.rs

//! The executing thread: a value stack for argument marshaling, call frames
//! and the stack of jump targets that catch failures.

use crate::config::ValueStackConfig;
use crate::error::{ArcadiaError, ArcadiaResult, Status};
use crate::growth::{Growth, GrowthStrategy};
use crate::runtime::ArcadiaVM;
use crate::value::{ForeignProcedure, Value};

#[derive(Debug)]
pub struct ValueStack {
    elements: Vec<Value>,
    capacity: usize,
    growth: Growth,
    additional: usize,
}

impl ValueStack {
    pub fn new(config: &ValueStackConfig) -> Self {
        ValueStack {
            elements: Vec::new(),
            capacity: 0,
            growth: Growth::with_maximum(config.maximum_capacity),
            additional: config.additional_capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&mut self, value: Value) -> ArcadiaResult<()> {
        if self.elements.len() == self.capacity {
            self.grow()?;
        }
        self.elements.push(value);
        Ok(())
    }

    /// Adds the configured increment, or whatever is left below the maximum.
    fn grow(&mut self) -> ArcadiaResult<()> {
        let new_capacity = self
            .growth
            .grow(self.capacity, self.additional, GrowthStrategy::Exact)
            .or_else(|_| self.growth.grow(self.capacity, 1, GrowthStrategy::Saturate))
            .map_err(|_| {
                ArcadiaError::allocation_failed(format!(
                    "value stack is at its maximum of {} values",
                    self.growth.maximum()
                ))
            })?;
        self.elements
            .try_reserve_exact(new_capacity - self.elements.len())
            .map_err(|e| ArcadiaError::allocation_failed(e.to_string()))?;
        self.capacity = new_capacity;
        Ok(())
    }

    pub fn pop(&mut self) -> ArcadiaResult<Value> {
        self.elements
            .pop()
            .ok_or_else(|| ArcadiaError::operation_invalid("value stack is empty"))
    }

    pub fn peek(&self) -> ArcadiaResult<Value> {
        self.elements
            .last()
            .copied()
            .ok_or_else(|| ArcadiaError::operation_invalid("value stack is empty"))
    }

    /// Index 0 is the bottom of the stack.
    pub fn get(&self, index: usize) -> ArcadiaResult<Value> {
        self.elements.get(index).copied().ok_or_else(|| {
            ArcadiaError::argument_value_invalid(format!(
                "stack index {} out of range for height {}",
                index,
                self.elements.len()
            ))
        })
    }

    pub fn truncate(&mut self, height: usize) {
        self.elements.truncate(height);
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.elements.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallInfo {
    pub stack_base: usize,
    pub argument_count: usize,
}

/// A resumption point. Catching restores the stack height and call depth
/// recorded here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpTarget {
    stack_size: usize,
    call_depth: usize,
    depth: usize,
}

#[derive(Debug)]
pub struct Thread {
    pub stack: ValueStack,
    calls: Vec<CallInfo>,
    jump_targets: Vec<JumpTarget>,
    status: Status,
}

impl Thread {
    pub fn new(config: &ValueStackConfig) -> Self {
        Thread {
            stack: ValueStack::new(config),
            calls: Vec::new(),
            jump_targets: Vec::new(),
            status: Status::Success,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn call_depth(&self) -> usize {
        self.calls.len()
    }

    pub fn jump_depth(&self) -> usize {
        self.jump_targets.len()
    }

    pub fn current_call(&self) -> Option<&CallInfo> {
        self.calls.last()
    }

    pub(crate) fn reset(&mut self) {
        self.stack.clear();
        self.calls.clear();
        self.jump_targets.clear();
        self.status = Status::Success;
    }
}

impl ArcadiaVM {
    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    pub fn thread_mut(&mut self) -> &mut Thread {
        &mut self.thread
    }

    pub fn status(&self) -> Status {
        self.thread.status
    }

    // === CALLS ===

    /// Calls `procedure` with `arguments` in a fresh frame. The frame and its
    /// stack slots are released whether or not the call succeeds.
    pub fn call(&mut self, procedure: ForeignProcedure, arguments: &[Value]) -> ArcadiaResult<Value> {
        let stack_base = self.thread.stack.len();
        self.thread.calls.push(CallInfo {
            stack_base,
            argument_count: arguments.len(),
        });
        let result = self.enter(procedure, arguments);
        self.thread.stack.truncate(stack_base);
        self.thread.calls.pop();
        result
    }

    fn enter(&mut self, procedure: ForeignProcedure, arguments: &[Value]) -> ArcadiaResult<Value> {
        for argument in arguments {
            self.thread.stack.push(*argument)?;
        }
        tracing::trace!(procedure = procedure.name(), arguments = arguments.len(), "call");
        (procedure.function())(self)
    }

    /// Calls a value holding a foreign procedure.
    pub fn call_value(&mut self, callee: Value, arguments: &[Value]) -> ArcadiaResult<Value> {
        let procedure = callee.get_foreign_procedure()?;
        self.call(procedure, arguments)
    }

    fn current_frame(&self) -> ArcadiaResult<CallInfo> {
        self.thread
            .calls
            .last()
            .copied()
            .ok_or_else(|| ArcadiaError::operation_invalid("no call is active"))
    }

    pub fn argument_count(&self) -> ArcadiaResult<usize> {
        Ok(self.current_frame()?.argument_count)
    }

    pub fn argument(&self, index: usize) -> ArcadiaResult<Value> {
        let frame = self.current_frame()?;
        if index >= frame.argument_count {
            return Err(ArcadiaError::argument_value_invalid(format!(
                "argument {} requested from a call with {} arguments",
                index, frame.argument_count
            )));
        }
        self.thread.stack.get(frame.stack_base + index)
    }

    pub fn expect_arguments(&self, expected: usize) -> ArcadiaResult<()> {
        let got = self.argument_count()?;
        if got != expected {
            return Err(ArcadiaError::number_of_arguments_invalid(expected, got));
        }
        Ok(())
    }

    // === JUMP TARGETS ===

    pub fn push_jump_target(&mut self) -> JumpTarget {
        let target = JumpTarget {
            stack_size: self.thread.stack.len(),
            call_depth: self.thread.calls.len(),
            depth: self.thread.jump_targets.len(),
        };
        self.thread.jump_targets.push(target);
        target
    }

    /// Removes the innermost target without transferring control.
    pub fn pop_jump_target(&mut self) -> ArcadiaResult<JumpTarget> {
        self.thread
            .jump_targets
            .pop()
            .ok_or_else(|| ArcadiaError::operation_invalid("no jump target to pop"))
    }

    /// Records `error`'s status on the thread and hands the error back for
    /// propagation to the innermost target: `return Err(vm.jump(error))`.
    pub fn jump(&mut self, error: ArcadiaError) -> ArcadiaError {
        self.thread.status = error.status;
        if self.thread.jump_targets.is_empty() {
            tracing::debug!(%error, "jump without an active target");
        }
        error
    }

    /// Runs `body` under a fresh jump target. On failure the stack height and
    /// call depth are restored and the status is recorded before the error
    /// is returned to the caller, which may retry or propagate it further.
    pub fn protect<R>(&mut self, body: impl FnOnce(&mut ArcadiaVM) -> ArcadiaResult<R>) -> ArcadiaResult<R> {
        let target = self.push_jump_target();
        let result = body(self);
        self.thread.jump_targets.truncate(target.depth);
        match result {
            Ok(value) => Ok(value),
            Err(error) => {
                self.thread.stack.truncate(target.stack_size);
                self.thread.calls.truncate(target.call_depth);
                self.thread.status = error.status;
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    fn sum(vm: &mut ArcadiaVM) -> ArcadiaResult<Value> {
        let mut total = 0i64;
        for i in 0..vm.argument_count()? {
            total += vm.argument(i)?.get_integer64()?;
        }
        Ok(Value::from(total))
    }

    fn pair(vm: &mut ArcadiaVM) -> ArcadiaResult<Value> {
        vm.expect_arguments(2)?;
        vm.argument(1)
    }

    const SUM: ForeignProcedure = ForeignProcedure::new("sum", sum);
    const PAIR: ForeignProcedure = ForeignProcedure::new("pair", pair);

    #[test]
    fn stack_grows_by_the_increment() {
        let mut stack = ValueStack::new(&ValueStackConfig::default());
        assert_eq!(stack.capacity(), 0);
        stack.push(Value::from(1u8)).unwrap();
        assert_eq!(stack.capacity(), 64);
        for i in 0..64u8 {
            stack.push(Value::from(i)).unwrap();
        }
        assert_eq!(stack.capacity(), 128);
        assert_eq!(stack.get(0).unwrap().get_natural8(), Ok(1));
        assert_eq!(stack.peek().unwrap().get_natural8(), Ok(63));
    }

    #[test]
    fn stack_saturates_then_fails() {
        let config = ValueStackConfig {
            additional_capacity: 4,
            maximum_capacity: 6,
        };
        let mut stack = ValueStack::new(&config);
        for _ in 0..6 {
            stack.push(Value::Void).unwrap();
        }
        assert_eq!(stack.capacity(), 6);
        assert_eq!(stack.push(Value::Void).unwrap_err().status, Status::AllocationFailed);
        assert_eq!(stack.len(), 6);
    }

    #[test]
    fn popping_an_empty_stack_is_invalid() {
        let mut stack = ValueStack::new(&ValueStackConfig::default());
        assert_eq!(stack.pop().unwrap_err().status, Status::OperationInvalid);
        assert_eq!(stack.peek().unwrap_err().status, Status::OperationInvalid);
        assert_eq!(stack.get(0).unwrap_err().status, Status::ArgumentValueInvalid);
    }

    #[test]
    fn calls_see_their_own_arguments() {
        let mut vm = ArcadiaVM::new().unwrap();
        vm.thread_mut().stack.push(Value::from(100i64)).unwrap();
        let args = [Value::from(1i64), Value::from(2i64), Value::from(3i64)];
        assert_eq!(vm.call(SUM, &args).unwrap().get_integer64(), Ok(6));
        assert_eq!(vm.thread().stack.len(), 1);
        assert_eq!(vm.thread().call_depth(), 0);
        assert_eq!(vm.call_value(Value::from(SUM), &[]).unwrap().get_integer64(), Ok(0));
    }

    #[test]
    fn argument_count_is_checked() {
        let mut vm = ArcadiaVM::new().unwrap();
        let error = vm.call(PAIR, &[Value::Void]).unwrap_err();
        assert_eq!(error.status, Status::NumberOfArgumentsInvalid);
        assert_eq!(vm.thread().stack.len(), 0);
        let second = vm.call(PAIR, &[Value::from(true), Value::from(false)]).unwrap();
        assert_eq!(second.get_boolean(), Ok(false));
        assert_eq!(vm.argument(0).unwrap_err().status, Status::OperationInvalid);
    }

    #[test]
    fn calling_a_non_procedure_is_a_type_error() {
        let mut vm = ArcadiaVM::new().unwrap();
        let error = vm.call_value(Value::from(3i32), &[]).unwrap_err();
        assert_eq!(error.status, Status::ArgumentTypeInvalid);
    }

    #[test]
    fn protect_restores_the_stack_on_failure() {
        let mut vm = ArcadiaVM::new().unwrap();
        vm.thread_mut().stack.push(Value::from(1u8)).unwrap();
        let result: ArcadiaResult<()> = vm.protect(|vm| {
            vm.thread_mut().stack.push(Value::from(2u8))?;
            vm.thread_mut().stack.push(Value::from(3u8))?;
            vm.push_jump_target();
            Err(vm.jump(ArcadiaError::not_found("missing")))
        });
        assert_eq!(result.unwrap_err().status, Status::NotFound);
        assert_eq!(vm.status(), Status::NotFound);
        assert_eq!(vm.thread().stack.len(), 1);
        assert_eq!(vm.thread().jump_depth(), 0);
    }

    #[test]
    fn nested_protect_catches_innermost_first() {
        let mut vm = ArcadiaVM::new().unwrap();
        let outer = vm.protect(|vm| {
            let inner: ArcadiaResult<()> = vm.protect(|_| Err(ArcadiaError::operation_invalid("inner")));
            assert_eq!(inner.unwrap_err().status, Status::OperationInvalid);
            assert_eq!(vm.thread().jump_depth(), 1);
            Ok(7)
        });
        assert_eq!(outer.unwrap(), 7);
        assert_eq!(vm.thread().jump_depth(), 0);
    }

    #[test]
    fn pop_without_push_is_invalid() {
        let mut vm = ArcadiaVM::new().unwrap();
        let target = vm.push_jump_target();
        assert_eq!(vm.pop_jump_target().unwrap(), target);
        assert_eq!(vm.pop_jump_target().unwrap_err().status, Status::OperationInvalid);
    }

    #[test]
    fn value_stack_limits_come_from_config() {
        let mut config = RuntimeConfig::default();
        config.value_stack.additional_capacity = 2;
        config.value_stack.maximum_capacity = 2;
        let mut vm = ArcadiaVM::with_config(config).unwrap();
        let error = vm.call(SUM, &[Value::from(1i64); 3]).unwrap_err();
        assert_eq!(error.status, Status::AllocationFailed);
        assert_eq!(vm.thread().stack.len(), 0);
    }
}
