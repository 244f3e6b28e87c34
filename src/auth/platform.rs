use oso::PolarClass;

/// Resource standing for the marketplace as a whole, for actions that are not
/// tied to a single ride.
#[derive(Clone, Copy, Debug, Default)]
pub struct Platform;

impl PolarClass for Platform {
    fn get_polar_class_builder() -> oso::ClassBuilder<Platform> {
        oso::Class::builder().name("Platform")
    }

    fn get_polar_class() -> oso::Class {
        let builder = Platform::get_polar_class_builder();
        builder.build()
    }
}
