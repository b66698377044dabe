/// What a component did with a key press.
///
/// Views try their components first (filter box, command line) and only fall
/// back to their own bindings on `NotHandled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Consumed, nothing for the view to do
  Handled,
  /// Consumed and produced an event the view acts on
  Event(T),
  NotHandled,
}
