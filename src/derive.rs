macro_rules! reader {
    ($this:ident) => {
        impl<'bytes> crate::Sealed for $this<'bytes> {}

        impl<'borrow> crate::Reader<crate::Borrowed<'borrow>> for $this<'borrow> {
            type Error = crate::Error;
            type Item = $this<'borrow>;

            fn read(source: crate::Borrowed<'borrow>) -> crate::Result<Self::Item> {
                <Self as crate::ReaderWithOptions<crate::Borrowed<'borrow>>>::read_with_options(
                    source,
                    &::core::default::Default::default(),
                )
            }
        }

        impl<'borrow> crate::ReaderWithOptions<crate::Borrowed<'borrow>> for $this<'borrow> {
            type Error = crate::Error;
            type Item = $this<'borrow>;
            type Options = crate::ReadOptions;

            fn read_with_options(
                source: crate::Borrowed<'borrow>,
                options: &crate::ReadOptions,
            ) -> crate::Result<Self::Item> {
                let mut source = crate::io::BorrowedSource::from(source.0);
                Self::do_read(&mut source, options)
            }
        }

        impl<'copied> crate::Reader<crate::Copied<'copied>> for $this<'static> {
            type Error = crate::Error;
            type Item = $this<'static>;

            fn read(source: crate::Copied<'copied>) -> crate::Result<Self::Item> {
                <Self as crate::ReaderWithOptions<crate::Copied<'copied>>>::read_with_options(
                    source,
                    &::core::default::Default::default(),
                )
            }
        }

        impl<'copied> crate::ReaderWithOptions<crate::Copied<'copied>> for $this<'static> {
            type Error = crate::Error;
            type Item = $this<'static>;
            type Options = crate::ReadOptions;

            fn read_with_options(
                source: crate::Copied<'copied>,
                options: &crate::ReadOptions,
            ) -> crate::Result<Self::Item> {
                let mut source = crate::io::CopiedSource::from(source.0);
                Self::do_read(&mut source, options)
            }
        }

        impl crate::Reader<&::std::fs::File> for $this<'static> {
            type Error = crate::Error;
            type Item = $this<'static>;

            fn read(source: &::std::fs::File) -> crate::Result<Self::Item> {
                <Self as crate::ReaderWithOptions<&::std::fs::File>>::read_with_options(
                    source,
                    &::core::default::Default::default(),
                )
            }
        }

        impl crate::ReaderWithOptions<&::std::fs::File> for $this<'static> {
            type Error = crate::Error;
            type Item = $this<'static>;
            type Options = crate::ReadOptions;

            fn read_with_options(
                source: &::std::fs::File,
                options: &crate::ReadOptions,
            ) -> crate::Result<Self::Item> {
                let mut source = crate::io::MappedSource::try_from(source)?;
                Self::do_read(&mut source, options)
            }
        }
    };
}

pub(crate) use reader;
